//! Source-media probing: `ffprobe` for geometry/duration/frame rate, and the
//! side encode that measures how many MiB a stream-copied audio track will
//! occupy in the output.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::EncodeError;
use crate::options::VideoInfo;

fn parse_compact_line(line: &str) -> (&str, impl Iterator<Item = (&str, &str)>) {
    let mut it = line.split('|');
    let kind = it.next().unwrap_or("");
    (kind, it.filter_map(|token| token.split_once('=')))
}

fn parse_frame_rate(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => s.trim().parse().ok(),
    }
}

/// Resolve the facts the orchestrator needs about the source video. The
/// first video stream wins; files without one are an error.
pub fn probe_video(filename: &Path) -> Result<VideoInfo, EncodeError> {
    let res = Command::new("ffprobe")
        .arg(filename)
        .arg("-of").arg("compact")
        .arg("-hide_banner")
        .arg("-show_streams").arg("-show_format")
        .arg("-show_entries")
        .arg("stream=codec_type,width,height,avg_frame_rate:stream_disposition=:format=duration")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(EncodeError::Launch)?
        .wait_with_output()?;
    if !res.status.success() {
        let stderr = String::from_utf8_lossy(&res.stderr);
        return Err(EncodeError::Io(std::io::Error::other(format!(
            "ffprobe returned error: {}",
            stderr.trim()
        ))));
    }

    let output = String::from_utf8_lossy(&res.stdout);
    parse_probe_output(&output)
}

/// Pure parse of ffprobe's compact output, split out for tests.
pub fn parse_probe_output(output: &str) -> Result<VideoInfo, EncodeError> {
    let mut duration: Option<f64> = None;
    let mut geometry: Option<(u32, u32, f64)> = None;

    for line in output.lines() {
        let (kind, params) = parse_compact_line(line.trim());
        match kind {
            "format" => {
                for (k, v) in params {
                    if k == "duration" {
                        duration = v.parse().ok();
                    }
                }
            }
            "stream" if geometry.is_none() => {
                let mut is_video = false;
                let mut width: Option<u32> = None;
                let mut height: Option<u32> = None;
                let mut rate: Option<f64> = None;
                for (k, v) in params {
                    match k {
                        "codec_type" => is_video = v == "video",
                        "width" => width = v.parse().ok(),
                        "height" => height = v.parse().ok(),
                        "avg_frame_rate" => rate = parse_frame_rate(v),
                        _ => {}
                    }
                }
                if is_video {
                    if let (Some(w), Some(h), Some(r)) = (width, height, rate) {
                        geometry = Some((w, h, r));
                    }
                }
            }
            _ => {}
        }
    }

    let (width, height, frame_rate) = geometry.ok_or(EncodeError::Probe("a video stream"))?;
    let duration_seconds = duration.ok_or(EncodeError::Probe("a duration"))?;
    Ok(VideoInfo { width, height, duration_seconds, frame_rate })
}

/// How many MiB the source's audio occupies, measured by stream-copying it
/// into a throwaway container. Any failure degrades to a 0 MiB reservation;
/// the job then simply sizes less precisely.
pub fn measure_audio_size_mib(program: &Path, input: &Path) -> f64 {
    let temp = match tempfile::Builder::new()
        .prefix("subburn-audio-")
        .suffix(".mka")
        .tempfile()
    {
        Ok(t) => t,
        Err(e) => {
            log::warn!("audio size probe skipped, no temp file: {}", e);
            return 0.0;
        }
    };

    let status = Command::new(program)
        .arg("-hide_banner")
        .arg("-y")
        .arg("-i").arg(input)
        .arg("-vn")
        .arg("-acodec").arg("copy")
        .arg(temp.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => match temp.as_file().metadata() {
            Ok(meta) => (meta.len() as f64 / 1024.0 / 1024.0).round(),
            Err(e) => {
                log::warn!("audio size probe failed to stat output: {}", e);
                0.0
            }
        },
        Ok(status) => {
            log::warn!("audio size probe exited with {}", status);
            0.0
        }
        Err(e) => {
            log::warn!("audio size probe failed to run: {}", e);
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SAMPLE: &str = "\
stream|codec_type=video|width=1920|height=1080|avg_frame_rate=24000/1001
stream|codec_type=audio|avg_frame_rate=0/0
format|duration=300.000000
";

    #[test]
    fn picks_the_video_stream() {
        let info = parse_probe_output(SAMPLE).unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert!((info.frame_rate - 23.976).abs() < 0.001);
        assert_eq!(info.duration_seconds, 300.0);
    }

    #[test]
    fn audio_only_input_is_an_error() {
        let out = "stream|codec_type=audio\nformat|duration=10.0\n";
        assert_matches!(parse_probe_output(out), Err(EncodeError::Probe(_)));
    }

    #[test]
    fn missing_duration_is_an_error() {
        let out = "stream|codec_type=video|width=640|height=480|avg_frame_rate=25/1\n";
        assert_matches!(parse_probe_output(out), Err(EncodeError::Probe(_)));
    }

    #[test]
    fn frame_rate_fractions() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("30"), Some(30.0));
    }
}
