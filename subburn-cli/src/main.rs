use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use subburn::options::even_dimension;
use subburn::subtitle::SubtitleTrack;
use subburn::{codecs, probe};
use subburn::{AudioChannelMode, AudioCodec, EncodeRequest, EncodeStatus, VideoCodec};

/// Burn a subtitle track permanently into a video file.
#[derive(clap::Parser)]
#[command(version, about)]
struct Args {
    /// Source video file
    input: PathBuf,
    /// ASS/SSA subtitle file to burn in
    subtitles: PathBuf,
    /// Output video file
    output: PathBuf,

    /// Output width in pixels (source width when omitted; odd values are
    /// rounded up)
    #[arg(long)]
    width: Option<u32>,
    /// Output height in pixels (source height when omitted)
    #[arg(long)]
    height: Option<u32>,

    /// Video encoder: libx264, libx265 or libvpx-vp9
    #[arg(long, default_value = "libx264")]
    codec: VideoCodec,
    #[arg(long, default_value = "medium")]
    preset: String,
    /// Quality (crf). Defaults per codec; ignored with --target-size
    #[arg(long)]
    crf: Option<u32>,
    /// Encoder tune, e.g. film or animation (not for vp9)
    #[arg(long)]
    tune: Option<String>,

    /// Audio handling: copy, aac, libmp3lame or libopus
    #[arg(long, default_value = "copy")]
    audio_codec: AudioCodec,
    /// Audio bitrate, "128" or "128k"
    #[arg(long, default_value = "128k", value_parser = parse_bitrate)]
    audio_bitrate: u32,
    #[arg(long, default_value_t = 44100)]
    sample_rate: u32,
    /// Channel handling when re-encoding: passthrough, stereo or
    /// forced-stereo
    #[arg(long, default_value = "passthrough")]
    channels: AudioChannelMode,

    /// Target output size in MiB; selects two-pass encoding
    #[arg(long)]
    target_size: Option<f64>,
    /// Override the Default style's font size (same-resolution jobs only)
    #[arg(long)]
    font_size: Option<f64>,

    /// Encoder binary (ffmpeg from PATH when omitted)
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
    /// Print a JSON summary instead of plain text
    #[arg(long)]
    json: bool,
    /// Print the full encoder log when done
    #[arg(short, long)]
    verbose: bool,
}

fn parse_bitrate(s: &str) -> Result<u32, String> {
    s.trim()
        .trim_end_matches(['k', 'K'])
        .parse()
        .map_err(|_| format!("invalid bitrate: {}", s))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();

    let subtitle_text = fs::read_to_string(&args.subtitles)
        .with_context(|| format!("reading {}", args.subtitles.display()))?;
    let subtitles = SubtitleTrack::from_ass(&subtitle_text)
        .with_context(|| format!("parsing {}", args.subtitles.display()))?;

    let source = probe::probe_video(&args.input)
        .with_context(|| format!("probing {}", args.input.display()))?;
    log::info!(
        "source: {}x{}, {:.1}s at {:.3} fps",
        source.width, source.height, source.duration_seconds, source.frame_rate
    );

    if let Some(crf) = args.crf {
        let range = args.codec.quality_range();
        if !range.contains(&crf) {
            bail!("crf {} is outside {}..={} for {}", crf, range.start(), range.end(), args.codec);
        }
    }

    let ffmpeg = args.ffmpeg.clone().unwrap_or_else(|| PathBuf::from("ffmpeg"));
    match codecs::list_encoders(&ffmpeg) {
        Ok(encoders) => {
            if !encoders.iter().any(|e| e == args.codec.encoder_name()) {
                bail!("{} does not provide the {} encoder", ffmpeg.display(), args.codec.encoder_name());
            }
            if !args.audio_codec.is_copy()
                && !encoders.iter().any(|e| e == args.audio_codec.encoder_name())
            {
                bail!("{} does not provide the {} encoder", ffmpeg.display(), args.audio_codec.encoder_name());
            }
        }
        Err(e) => bail!("cannot run {}: {}", ffmpeg.display(), e),
    }

    let request = EncodeRequest {
        input: args.input.clone(),
        subtitles,
        source,
        target_width: even_dimension(args.width.unwrap_or(source.width)),
        target_height: even_dimension(args.height.unwrap_or(source.height)),
        video_codec: args.codec,
        preset: args.preset.clone(),
        quality: args.crf,
        tune: args.tune.clone(),
        audio_codec: args.audio_codec,
        audio_sample_rate: args.sample_rate,
        audio_channels: args.channels,
        audio_bitrate_kbps: args.audio_bitrate,
        target_size_mib: args.target_size,
        font_size: args.font_size,
        output: args.output.clone(),
        ffmpeg: Some(ffmpeg),
    };

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            cancel.store(true, Ordering::Release);
        })
        .context("installing the Ctrl-C handler")?;
    }

    let bar = ProgressBar::new(source.total_frames());
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} frames  {msg}")
            .context("progress bar template")?,
    );

    let result = subburn::encode(&request, cancel, |update| {
        bar.set_position(update.frames_processed);
        if let Some(eta) = &update.time_remaining {
            bar.set_message(eta.clone());
        }
    });
    bar.finish_and_clear();

    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "status": result.status.to_string(),
                "output": result.output,
            })
        );
    } else {
        match &result.status {
            EncodeStatus::Succeeded => println!("wrote {}", result.output.display()),
            EncodeStatus::Canceled => println!("canceled"),
            EncodeStatus::Failed(reason) => eprintln!("encode failed: {}", reason),
        }
    }
    if args.verbose || matches!(result.status, EncodeStatus::Failed(_)) {
        eprintln!("{}", result.log);
    }

    std::process::exit(match result.status {
        EncodeStatus::Succeeded => 0,
        EncodeStatus::Canceled => 130,
        EncodeStatus::Failed(_) => 1,
    });
}
