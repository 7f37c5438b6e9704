//! Pure construction of one encoder invocation's argument list. Nothing in
//! here runs a process; PassRunner does that.

use std::path::Path;

use crate::options::{even_dimension, AudioChannelMode, EncodeRequest};

/// The resolved shape of one encoder invocation: which pass it is, the
/// two-pass bitrate when sizing mode is on, and the full argument list.
/// Created fresh per pass, never persisted.
#[derive(Debug, Clone)]
pub struct PassPlan {
    pub pass: Option<u8>,
    pub video_kbps: Option<u32>,
    pub args: Vec<String>,
}

impl PassPlan {
    pub fn new(
        request: &EncodeRequest,
        subtitle_path: &Path,
        pass: Option<u8>,
        video_kbps: Option<u32>,
    ) -> Self {
        PassPlan {
            pass,
            video_kbps,
            args: build_pass_args(request, subtitle_path, pass, video_kbps),
        }
    }
}

/// Both passes of a two-pass job must agree on the stats file; deriving it
/// from the per-job subtitle temp path keeps concurrent jobs apart.
pub fn pass_log_prefix(subtitle_path: &Path) -> std::path::PathBuf {
    subtitle_path.with_extension("passlog")
}

fn null_sink() -> &'static str {
    if cfg!(windows) {
        "NUL"
    } else {
        "/dev/null"
    }
}

// ffmpeg filter arguments have their own quoting layer on top of the shell's.
fn escape_filter_path(path: &Path) -> String {
    let mut escaped = String::new();
    for c in path.to_string_lossy().chars() {
        match c {
            '\\' => escaped.push('/'),
            ':' => escaped.push_str("\\:"),
            '\'' => escaped.push_str("\\'"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn burn_in_filter(request: &EncodeRequest, subtitle_path: &Path) -> String {
    let mut filter = format!("ass='{}'", escape_filter_path(subtitle_path));
    if request.resizes() {
        filter.push_str(&format!(
            ",scale={}:{}",
            even_dimension(request.target_width),
            even_dimension(request.target_height)
        ));
    }
    filter
}

/// The full argument list for one pass. `pass` of None means a single
/// quality-mode invocation; `video_kbps` must be Some exactly when `pass`
/// is (crf and explicit bitrate are mutually exclusive).
pub fn build_pass_args(
    request: &EncodeRequest,
    subtitle_path: &Path,
    pass: Option<u8>,
    video_kbps: Option<u32>,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-y".into(),
        "-i".into(),
        request.input.to_string_lossy().into_owned(),
        "-vf".into(),
        burn_in_filter(request, subtitle_path),
        "-c:v".into(),
        request.video_codec.encoder_name().into(),
    ];

    if !request.preset.is_empty() {
        args.push("-preset".into());
        args.push(request.preset.clone());
    }
    if request.video_codec.supports_tune() {
        if let Some(tune) = request.tune.as_deref().filter(|t| !t.is_empty()) {
            args.push("-tune".into());
            args.push(tune.into());
        }
    }

    match video_kbps {
        Some(kbps) => {
            args.push("-b:v".into());
            args.push(format!("{}k", kbps));
            if let Some(pass) = pass {
                args.push("-pass".into());
                args.push(pass.to_string());
                args.push("-passlogfile".into());
                args.push(pass_log_prefix(subtitle_path).to_string_lossy().into_owned());
            }
        }
        None => {
            let crf = request.quality.unwrap_or_else(|| request.video_codec.default_quality());
            args.push("-crf".into());
            args.push(crf.to_string());
            if request.video_codec == crate::options::VideoCodec::Vp9 {
                // vp9 treats -crf as a cap unless the bitrate is zeroed
                args.push("-b:v".into());
                args.push("0".into());
            }
        }
    }

    args.push("-pix_fmt".into());
    args.push("yuv420p".into());

    if pass == Some(1) {
        // the stats pass produces no output worth keeping
        args.push("-an".into());
    } else if request.audio_codec.is_copy() {
        args.push("-c:a".into());
        args.push("copy".into());
    } else {
        args.push("-c:a".into());
        args.push(request.audio_codec.encoder_name().into());
        args.push("-b:a".into());
        args.push(format!("{}k", request.audio_bitrate_kbps));
        args.push("-ar".into());
        args.push(request.audio_sample_rate.to_string());
        match request.audio_channels {
            AudioChannelMode::Passthrough => {}
            AudioChannelMode::Stereo => {
                args.push("-ac".into());
                args.push("2".into());
            }
            AudioChannelMode::ForcedStereo => {
                args.push("-ac".into());
                args.push("2".into());
                args.push("-af".into());
                args.push("aformat=channel_layouts=stereo".into());
            }
        }
    }

    if pass == Some(1) {
        args.push("-f".into());
        args.push("null".into());
        args.push(null_sink().into());
    } else {
        args.push(request.output.to_string_lossy().into_owned());
    }

    args
}
