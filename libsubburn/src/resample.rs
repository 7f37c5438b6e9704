//! Scales resolution-dependent subtitle quantities from the source geometry
//! to the target geometry: style fields, and the inline override tags that
//! carry absolute pixel values (`\fs`, `\pos`/`\move`/`\org`, and `{\p1}`
//! vector drawings). Malformed tags pass through unchanged; resampling is
//! best-effort and never fails.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// `value * target / source`, rounded. For whole-pixel fields.
pub fn resample(source: u32, target: u32, value: i32) -> i32 {
    (value as f64 * target as f64 / source as f64).round() as i32
}

/// Fraction-preserving variant, for outline/shadow/spacing.
pub fn resample_f(source: u32, target: u32, value: f64) -> f64 {
    value * target as f64 / source as f64
}

/// Source and target geometry for one job. Horizontal quantities scale by
/// the width ratio, vertical ones by the height ratio.
#[derive(Debug, Clone, Copy)]
pub struct ResampleRatio {
    pub source_width: u32,
    pub target_width: u32,
    pub source_height: u32,
    pub target_height: u32,
}

impl ResampleRatio {
    fn x(&self, v: f64) -> f64 {
        v * self.target_width as f64 / self.source_width as f64
    }

    fn y(&self, v: f64) -> f64 {
        v * self.target_height as f64 / self.source_height as f64
    }
}

// \fs is followed by the size directly; \fscx/\fscy/\fsp never match because
// a letter follows the "fs".
static FONT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\fs(\d+(?:\.\d+)?)").unwrap());

static POS_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(pos|org)\(\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*\)").unwrap());

static MOVE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\move\(([^)]*)\)").unwrap());

static DRAW_ON: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\p([0-9]+)").unwrap());

/// Apply all three tag categories once. The caller applies this exactly one
/// time per job; a second application would scale twice.
pub fn resample_override_tags(r: ResampleRatio, text: &str) -> String {
    let text = resample_font_tags(r, text);
    let text = resample_position_tags(r, &text);
    resample_drawing_tags(r, &text)
}

/// `\fs<size>` scales with the height ratio and stays a whole number.
pub fn resample_font_tags(r: ResampleRatio, text: &str) -> String {
    FONT_TAG
        .replace_all(text, |caps: &Captures| {
            match caps[1].parse::<f64>() {
                Ok(size) => format!("\\fs{}", r.y(size).round() as i64),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// `\pos(x,y)`, `\org(x,y)` and the first four arguments of `\move(...)`.
/// Trailing `\move` time arguments are carried over untouched.
pub fn resample_position_tags(r: ResampleRatio, text: &str) -> String {
    let text = POS_TAG.replace_all(text, |caps: &Captures| {
        match (caps[2].parse::<f64>(), caps[3].parse::<f64>()) {
            (Ok(x), Ok(y)) => format!(
                "\\{}({},{})",
                &caps[1],
                r.x(x).round() as i64,
                r.y(y).round() as i64
            ),
            _ => caps[0].to_string(),
        }
    });
    MOVE_TAG
        .replace_all(&text, |caps: &Captures| {
            let args: Vec<&str> = caps[1].split(',').map(|a| a.trim()).collect();
            if args.len() != 4 && args.len() != 6 {
                return caps[0].to_string();
            }
            let mut scaled = Vec::with_capacity(args.len());
            for (i, arg) in args.iter().enumerate() {
                if i < 4 {
                    match arg.parse::<f64>() {
                        Ok(v) => {
                            let v = if i % 2 == 0 { r.x(v) } else { r.y(v) };
                            scaled.push((v.round() as i64).to_string());
                        }
                        Err(_) => return caps[0].to_string(),
                    }
                } else {
                    scaled.push(arg.to_string());
                }
            }
            format!("\\move({})", scaled.join(","))
        })
        .into_owned()
}

/// Vector drawing text between a `{..\p<n>..}` tag with n > 0 and the next
/// `{..\p0..}` (or end of line): alternating x/y coordinates following the
/// one-letter drawing commands. A segment that fails to parse is left
/// exactly as it was.
pub fn resample_drawing_tags(r: ResampleRatio, text: &str) -> String {
    if !text.contains("\\p") {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut drawing = false;
    let mut rest = text;
    while !rest.is_empty() {
        if let Some(open) = rest.find('{') {
            let plain = &rest[..open];
            out.push_str(&scale_segment(r, plain, drawing));
            match rest[open..].find('}') {
                Some(close_rel) => {
                    let block = &rest[open..open + close_rel + 1];
                    if let Some(caps) = DRAW_ON.captures_iter(block).last() {
                        drawing = caps[1].parse::<u32>().map(|n| n > 0).unwrap_or(false);
                    }
                    out.push_str(block);
                    rest = &rest[open + close_rel + 1..];
                }
                None => {
                    // unterminated override block, give up on the remainder
                    out.push_str(&rest[open..]);
                    break;
                }
            }
        } else {
            out.push_str(&scale_segment(r, rest, drawing));
            break;
        }
    }
    out
}

const DRAW_COMMANDS: &[char] = &['m', 'n', 'l', 'b', 's', 'p', 'c'];

fn scale_segment(r: ResampleRatio, segment: &str, drawing: bool) -> String {
    if !drawing || segment.trim().is_empty() {
        return segment.to_string();
    }
    let mut scaled = Vec::new();
    let mut is_x = true;
    for token in segment.split_whitespace() {
        let mut chars = token.chars();
        let first = chars.next().unwrap_or(' ');
        if chars.as_str().is_empty() && DRAW_COMMANDS.contains(&first.to_ascii_lowercase()) {
            scaled.push(token.to_string());
            is_x = true; // every command starts a fresh x y sequence
        } else if let Ok(v) = token.parse::<f64>() {
            let v = if is_x { r.x(v) } else { r.y(v) };
            scaled.push((v.round() as i64).to_string());
            is_x = !is_x;
        } else {
            return segment.to_string();
        }
    }
    scaled.join(" ")
}
