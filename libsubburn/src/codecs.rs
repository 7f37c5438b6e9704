//! Encoder discovery: ask the encoder binary what it can actually encode,
//! so a request for a codec the local build lacks fails up front instead of
//! mid-job.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// Names of every video and audio encoder the binary reports.
pub fn list_encoders(program: &Path) -> io::Result<Vec<String>> {
    let out = Command::new(program)
        .args(["-hide_banner", "-encoders"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?
        .wait_with_output()?;
    if !out.status.success() {
        return Err(io::Error::other(format!("{} -encoders exited with {}", program.display(), out.status)));
    }
    let text = String::from_utf8_lossy(&out.stdout);
    Ok(parse_encoder_names(&text))
}

/// Parse the `-encoders` table. The listing opens with a flag legend closed
/// by a dashed line; rows are `<flags> <name> <description>`.
pub fn parse_encoder_names(output: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut in_table = false;
    for line in output.lines() {
        let line = line.trim();
        if !in_table {
            in_table = line.starts_with("------");
            continue;
        }
        let mut tokens = line.split_whitespace();
        let flags = match tokens.next() {
            Some(f) => f,
            None => continue,
        };
        if !(flags.starts_with('V') || flags.starts_with('A')) {
            continue;
        }
        if let Some(name) = tokens.next() {
            names.push(name.to_string());
        }
    }
    names
}

pub fn encoder_available(program: &Path, encoder: &str) -> io::Result<bool> {
    Ok(list_encoders(program)?.iter().any(|name| name == encoder))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Encoders:
 V..... = Video
 A..... = Audio
 S..... = Subtitle
 .F.... = Frame-level multithreading
 ------
 V....D a64multi             Multicolor charset for Commodore 64 (codec a64_multi)
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D libvpx-vp9           libvpx VP9 (codec vp9)
 A....D aac                  AAC (Advanced Audio Coding)
 A....D libopus              libopus Opus
 S..... ass                  ASS (Advanced SubStation Alpha) subtitle
";

    #[test]
    fn parses_video_and_audio_encoders() {
        let names = parse_encoder_names(SAMPLE);
        assert!(names.contains(&"libx264".to_string()));
        assert!(names.contains(&"libvpx-vp9".to_string()));
        assert!(names.contains(&"aac".to_string()));
        // subtitle encoders are not usable as -c:v / -c:a
        assert!(!names.contains(&"ass".to_string()));
    }

    #[test]
    fn legend_lines_are_not_encoders() {
        let names = parse_encoder_names(SAMPLE);
        assert!(!names.iter().any(|n| n == "="));
        assert_eq!(names.len(), 5);
    }
}
