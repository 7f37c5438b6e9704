//! Narrow model of an ASS/SSA subtitle track: just enough structure to
//! restyle the header and serialize the track to a temp file for the
//! encoder's subtitle filter. Everything else about the format stays with
//! the subtitle editor that produced the track.

use crate::error::EncodeError;

/// Resolution-dependent fields of one style line. Margins and font size are
/// whole pixels; outline, shadow and spacing keep fractions.
#[derive(Debug, Clone, PartialEq)]
pub struct SsaStyle {
    pub name: String,
    pub font_size: f64,
    pub margin_left: i32,
    pub margin_right: i32,
    pub margin_vertical: i32,
    pub outline_width: f64,
    pub shadow_width: f64,
    pub letter_spacing: f64,
}

/// One Dialogue event. `text` may carry inline override tags.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Paragraph {
    pub layer: i32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub style: String,
    pub actor: String,
    pub margin_l: i32,
    pub margin_r: i32,
    pub margin_v: i32,
    pub effect: String,
    pub text: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SubtitleTrack {
    /// Everything up to (not including) the `[Events]` section, verbatim.
    pub header: String,
    pub events: Vec<Paragraph>,
}

// Standard V4+ style Format columns, used when the header has no Format line.
const STYLE_FORMAT_DEFAULT: &[&str] = &[
    "Name", "Fontname", "Fontsize", "PrimaryColour", "SecondaryColour", "OutlineColour",
    "BackColour", "Bold", "Italic", "Underline", "StrikeOut", "ScaleX", "ScaleY", "Spacing",
    "Angle", "BorderStyle", "Outline", "Shadow", "Alignment", "MarginL", "MarginR", "MarginV",
    "Encoding",
];

const DEFAULT_STYLE_LINE: &str = "Style: Default,Arial,20,&H00FFFFFF,&H000000FF,&H00000000,&H00000000,0,0,0,0,100,100,0,0,1,2,2,2,10,10,10,1";

struct StyleColumns {
    name: usize,
    font_size: usize,
    margin_l: usize,
    margin_r: usize,
    margin_v: usize,
    outline: usize,
    shadow: usize,
    spacing: usize,
}

impl StyleColumns {
    fn from_format(fields: &[&str]) -> Option<Self> {
        let find = |key: &str| fields.iter().position(|f| f.eq_ignore_ascii_case(key));
        Some(StyleColumns {
            name: find("Name")?,
            font_size: find("Fontsize")?,
            margin_l: find("MarginL")?,
            margin_r: find("MarginR")?,
            margin_v: find("MarginV")?,
            outline: find("Outline")?,
            shadow: find("Shadow")?,
            spacing: find("Spacing")?,
        })
    }

    fn standard() -> Self {
        let fields: Vec<&str> = STYLE_FORMAT_DEFAULT.to_vec();
        Self::from_format(&fields).expect("standard format has all columns")
    }
}

fn parse_num<T: std::str::FromStr + Default>(s: &str) -> T {
    s.trim().parse().unwrap_or_default()
}

/// Format a fractional value the way ASS files usually carry them: whole
/// numbers without a decimal point, fractions trimmed to two places.
fn fmt_num(v: f64) -> String {
    if (v - v.round()).abs() < 1e-6 {
        format!("{}", v.round() as i64)
    } else {
        let s = format!("{:.2}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn parse_timestamp(s: &str) -> Option<u64> {
    let mut it = s.trim().splitn(3, ':');
    let h: u64 = it.next()?.trim().parse().ok()?;
    let m: u64 = it.next()?.trim().parse().ok()?;
    let sec: f64 = it.next()?.trim().parse().ok()?;
    Some(((h * 3600 + m * 60) as f64 * 1000.0 + sec * 1000.0).round() as u64)
}

fn format_timestamp(ms: u64) -> String {
    let cs = (ms + 5) / 10; // round to centiseconds
    format!("{}:{:02}:{:02}.{:02}", cs / 360000, cs / 6000 % 60, cs / 100 % 60, cs % 100)
}

impl SubtitleTrack {
    /// Parse ASS text. Only `Dialogue:` events are kept; the header is
    /// preserved verbatim so unknown sections round-trip untouched.
    pub fn from_ass(text: &str) -> Result<Self, EncodeError> {
        let mut header = String::new();
        let mut events = Vec::new();
        let mut in_events = false;
        // Standard event column order; replaced if the file carries its own
        // Format line.
        let mut order: Vec<String> = ["Layer", "Start", "End", "Style", "Name", "MarginL", "MarginR", "MarginV", "Effect", "Text"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.eq_ignore_ascii_case("[Events]") {
                in_events = true;
                continue;
            }
            if !in_events {
                header.push_str(line);
                header.push('\n');
                continue;
            }
            if let Some(rest) = strip_prefix_ci(trimmed, "Format:") {
                order = rest.split(',').map(|f| f.trim().to_string()).collect();
            } else if let Some(rest) = strip_prefix_ci(trimmed, "Dialogue:") {
                if let Some(p) = parse_dialogue(rest, &order) {
                    events.push(p);
                }
            }
        }

        if !in_events {
            return Err(EncodeError::Subtitle("no [Events] section".into()));
        }
        Ok(SubtitleTrack { header, events })
    }

    pub fn to_ass(&self) -> String {
        let mut out = self.header.clone();
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("[Events]\n");
        out.push_str("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");
        for p in &self.events {
            out.push_str(&format!(
                "Dialogue: {},{},{},{},{},{},{},{},{},{}\n",
                p.layer,
                format_timestamp(p.start_ms),
                format_timestamp(p.end_ms),
                p.style,
                p.actor,
                p.margin_l,
                p.margin_r,
                p.margin_v,
                p.effect,
                p.text,
            ));
        }
        out
    }

    /// Run `f` over every style line in the header's styles section,
    /// rewriting the resolution-dependent columns in place. Columns the
    /// model does not carry are preserved verbatim.
    pub fn map_styles(&mut self, mut f: impl FnMut(&mut SsaStyle)) {
        let mut cols = StyleColumns::standard();
        let mut in_styles = false;
        let mut lines: Vec<String> = self.header.lines().map(|l| l.to_string()).collect();

        for line in lines.iter_mut() {
            let trimmed = line.trim();
            if trimmed.starts_with('[') {
                in_styles = trimmed.eq_ignore_ascii_case("[V4+ Styles]")
                    || trimmed.eq_ignore_ascii_case("[V4 Styles]");
                continue;
            }
            if !in_styles {
                continue;
            }
            if let Some(rest) = strip_prefix_ci(trimmed, "Format:") {
                let fields: Vec<&str> = rest.split(',').map(|f| f.trim()).collect();
                if let Some(c) = StyleColumns::from_format(&fields) {
                    cols = c;
                }
            } else if let Some(rest) = strip_prefix_ci(trimmed, "Style:") {
                let mut fields: Vec<String> = rest.split(',').map(|s| s.trim().to_string()).collect();
                let needed = [cols.name, cols.font_size, cols.margin_l, cols.margin_r, cols.margin_v, cols.outline, cols.shadow, cols.spacing];
                if needed.iter().any(|&i| i >= fields.len()) {
                    continue; // malformed style line, leave it alone
                }
                let mut style = SsaStyle {
                    name: fields[cols.name].clone(),
                    font_size: parse_num(&fields[cols.font_size]),
                    margin_left: parse_num(&fields[cols.margin_l]),
                    margin_right: parse_num(&fields[cols.margin_r]),
                    margin_vertical: parse_num(&fields[cols.margin_v]),
                    outline_width: parse_num(&fields[cols.outline]),
                    shadow_width: parse_num(&fields[cols.shadow]),
                    letter_spacing: parse_num(&fields[cols.spacing]),
                };
                f(&mut style);
                fields[cols.name] = style.name;
                fields[cols.font_size] = fmt_num(style.font_size.round());
                fields[cols.margin_l] = style.margin_left.to_string();
                fields[cols.margin_r] = style.margin_right.to_string();
                fields[cols.margin_v] = style.margin_vertical.to_string();
                fields[cols.outline] = fmt_num(style.outline_width);
                fields[cols.shadow] = fmt_num(style.shadow_width);
                fields[cols.spacing] = fmt_num(style.letter_spacing);
                *line = format!("Style: {}", fields.join(","));
            }
        }
        self.header = lines.join("\n");
        self.header.push('\n');
    }

    /// Parsed copies of every style line, in header order.
    pub fn styles(&self) -> Vec<SsaStyle> {
        let mut out = Vec::new();
        // map_styles needs &mut self; collect through a clone instead.
        let mut clone = self.clone();
        clone.map_styles(|s| out.push(s.clone()));
        out
    }

    /// Rewrite the Default style's font size, adding a Default style when
    /// the header has none.
    pub fn set_default_font_size(&mut self, size: f64) {
        let mut found = false;
        self.map_styles(|s| {
            if s.name.eq_ignore_ascii_case("Default") {
                s.font_size = size;
                found = true;
            }
        });
        if found {
            return;
        }
        let mut lines: Vec<String> = self.header.lines().map(|l| l.to_string()).collect();
        let line = {
            let mut fields: Vec<String> = DEFAULT_STYLE_LINE
                .trim_start_matches("Style: ")
                .split(',')
                .map(|s| s.to_string())
                .collect();
            fields[2] = fmt_num(size.round());
            format!("Style: {}", fields.join(","))
        };
        if let Some(pos) = lines.iter().position(|l| {
            let t = l.trim();
            t.eq_ignore_ascii_case("[V4+ Styles]") || t.eq_ignore_ascii_case("[V4 Styles]")
        }) {
            // after the section header and its Format line, if any
            let mut insert_at = pos + 1;
            if lines.get(insert_at).map_or(false, |l| strip_prefix_ci(l.trim(), "Format:").is_some()) {
                insert_at += 1;
            }
            lines.insert(insert_at, line);
        } else {
            lines.push("[V4+ Styles]".into());
            lines.push(format!("Format: {}", STYLE_FORMAT_DEFAULT.join(", ")));
            lines.push(line);
        }
        self.header = lines.join("\n");
        self.header.push('\n');
    }

    /// Set (or insert) a `Key: value` line in the `[Script Info]` section.
    pub fn set_script_info(&mut self, key: &str, value: &str) {
        let mut lines: Vec<String> = self.header.lines().map(|l| l.to_string()).collect();
        let mut in_info = false;
        let prefix = format!("{}:", key);
        for line in lines.iter_mut() {
            let trimmed = line.trim();
            if trimmed.starts_with('[') {
                if in_info {
                    break;
                }
                in_info = trimmed.eq_ignore_ascii_case("[Script Info]");
                continue;
            }
            if in_info && strip_prefix_ci(trimmed, &prefix).is_some() {
                *line = format!("{}: {}", key, value);
                self.header = lines.join("\n");
                self.header.push('\n');
                return;
            }
        }
        let entry = format!("{}: {}", key, value);
        if let Some(pos) = lines.iter().position(|l| l.trim().eq_ignore_ascii_case("[Script Info]")) {
            lines.insert(pos + 1, entry);
        } else {
            lines.insert(0, "[Script Info]".into());
            lines.insert(1, entry);
        }
        self.header = lines.join("\n");
        self.header.push('\n');
    }
}

// Byte-wise so a multi-byte character after an ASCII prefix can never land
// the slice off a char boundary.
fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len()
        && line.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    {
        Some(line[prefix.len()..].trim_start())
    } else {
        None
    }
}

fn parse_dialogue(rest: &str, order: &[String]) -> Option<Paragraph> {
    let fields: Vec<&str> = rest.splitn(order.len(), ',').collect();
    if fields.len() < order.len() {
        return None;
    }
    let get = |key: &str| {
        order
            .iter()
            .position(|f| f.eq_ignore_ascii_case(key))
            .and_then(|i| fields.get(i).copied())
    };
    Some(Paragraph {
        layer: get("Layer").map(parse_num).unwrap_or(0),
        start_ms: parse_timestamp(get("Start")?)?,
        end_ms: parse_timestamp(get("End")?)?,
        style: get("Style").unwrap_or("Default").trim().to_string(),
        actor: get("Name").unwrap_or("").trim().to_string(),
        margin_l: get("MarginL").map(parse_num).unwrap_or(0),
        margin_r: get("MarginR").map(parse_num).unwrap_or(0),
        margin_v: get("MarginV").map(parse_num).unwrap_or(0),
        effect: get("Effect").unwrap_or("").trim().to_string(),
        text: get("Text").unwrap_or("").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[Script Info]
Title: sample
PlayResX: 1920
PlayResY: 1080

[V4+ Styles]
Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding
Style: Default,Arial,48,&H00FFFFFF,&H000000FF,&H00000000,&H00000000,0,0,0,0,100,100,0,0,1,2,1,2,10,10,20,1
Style: Sign,Verdana,36,&H00FFFFFF,&H000000FF,&H00000000,&H00000000,0,0,0,0,100,100,0.5,0,1,3,0,8,30,30,10,1

[Events]
Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text
Dialogue: 0,0:00:01.00,0:00:03.50,Default,,0,0,0,,Hello, world
Dialogue: 0,0:00:04.00,0:00:06.00,Sign,,0,0,0,,{\\pos(960,540)}Sign text
";

    #[test]
    fn parses_header_and_events() {
        let track = SubtitleTrack::from_ass(SAMPLE).unwrap();
        assert_eq!(track.events.len(), 2);
        assert_eq!(track.events[0].start_ms, 1000);
        assert_eq!(track.events[0].end_ms, 3500);
        // commas in the text column survive
        assert_eq!(track.events[0].text, "Hello, world");
        assert!(track.header.contains("PlayResX: 1920"));
    }

    #[test]
    fn styles_are_read_with_format_order() {
        let track = SubtitleTrack::from_ass(SAMPLE).unwrap();
        let styles = track.styles();
        assert_eq!(styles.len(), 2);
        assert_eq!(styles[0].name, "Default");
        assert_eq!(styles[0].font_size, 48.0);
        assert_eq!(styles[1].letter_spacing, 0.5);
        assert_eq!(styles[1].margin_vertical, 10);
    }

    #[test]
    fn map_styles_rewrites_only_known_columns() {
        let mut track = SubtitleTrack::from_ass(SAMPLE).unwrap();
        track.map_styles(|s| {
            s.font_size = 32.0;
            s.outline_width = 1.5;
        });
        assert!(track.header.contains("Style: Default,Arial,32,"));
        assert!(track.header.contains(",1,1.5,1,2,10,10,20,1"));
    }

    #[test]
    fn default_font_size_override() {
        let mut track = SubtitleTrack::from_ass(SAMPLE).unwrap();
        track.set_default_font_size(60.0);
        let styles = track.styles();
        assert_eq!(styles[0].font_size, 60.0);
        assert_eq!(styles[1].font_size, 36.0);
    }

    #[test]
    fn script_info_upsert() {
        let mut track = SubtitleTrack::from_ass(SAMPLE).unwrap();
        track.set_script_info("PlayResX", "1280");
        track.set_script_info("ScaledBorderAndShadow", "yes");
        assert!(track.header.contains("PlayResX: 1280"));
        assert!(!track.header.contains("PlayResX: 1920"));
        assert!(track.header.contains("ScaledBorderAndShadow: yes"));
    }

    #[test]
    fn serialization_round_trips_events() {
        let track = SubtitleTrack::from_ass(SAMPLE).unwrap();
        let text = track.to_ass();
        let again = SubtitleTrack::from_ass(&text).unwrap();
        assert_eq!(again.events.len(), 2);
        assert_eq!(again.events[1].text, "{\\pos(960,540)}Sign text");
        assert_eq!(again.events[1].start_ms, 4000);
    }

    #[test]
    fn missing_events_section_is_an_error() {
        assert!(SubtitleTrack::from_ass("[Script Info]\nTitle: x\n").is_err());
    }
}
