//! The top of the engine: takes a resolved [EncodeRequest], prepares the
//! subtitle temp file (resampling if the geometry changes), plans one or two
//! encoder passes, supervises them, and reports a terminal [EncodeResult].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::NamedTempFile;

use crate::bitrate::two_pass_video_kbps;
use crate::command::{pass_log_prefix, PassPlan};
use crate::error::EncodeError;
use crate::options::{even_dimension, EncodeRequest};
use crate::pass::{EncodeLog, PassOutcome, PassRunner};
use crate::probe::measure_audio_size_mib;
use crate::progress::{format_remaining, ProgressState};
use crate::resample::{self, ResampleRatio};
use crate::subtitle::SubtitleTrack;

/// One progress tick: frames done in the current pass, the fixed total, and
/// the remaining-time text once enough has happened to estimate it.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub frames_processed: u64,
    pub total_frames: u64,
    pub time_remaining: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum EncodeStatus {
    Succeeded,
    Canceled,
    Failed(String),
}

impl std::fmt::Display for EncodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeStatus::Succeeded => f.write_str("succeeded"),
            EncodeStatus::Canceled => f.write_str("canceled"),
            EncodeStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug)]
pub struct EncodeResult {
    pub status: EncodeStatus,
    pub output: PathBuf,
    /// Full diagnostic log: job preamble, every encoder line, and the
    /// terminal reason when something went wrong.
    pub log: String,
}

/// Run one burn-in job to a terminal state. `cancel` may be flipped from any
/// thread; the running pass is killed within one poll interval. `on_progress`
/// is invoked from the supervising thread, roughly every poll tick.
pub fn encode(
    request: &EncodeRequest,
    cancel: Arc<AtomicBool>,
    mut on_progress: impl FnMut(&ProgressUpdate),
) -> EncodeResult {
    let log = EncodeLog::new();
    let status = match run_job(request, &cancel, &log, &mut on_progress) {
        Ok(status) => status,
        Err(e) => {
            let reason = e.to_string();
            log.append_line(&reason);
            EncodeStatus::Failed(reason)
        }
    };
    log::info!("encode of {} {}", request.input.display(), status);
    EncodeResult {
        status,
        output: request.output.clone(),
        log: log.snapshot(),
    }
}

fn run_job(
    request: &EncodeRequest,
    cancel: &Arc<AtomicBool>,
    log: &EncodeLog,
    on_progress: &mut impl FnMut(&ProgressUpdate),
) -> Result<EncodeStatus, EncodeError> {
    log.append_line(&format!("Target file name: {}", request.output.display()));
    log.append_line(&format!("Video info width: {}", request.source.width));
    log.append_line(&format!("Video info height: {}", request.source.height));
    log.append_line(&format!("Video info total frames: {}", request.source.total_frames()));
    log.append_line(&format!("Video info total seconds: {}", request.source.duration_seconds));

    if request.output.exists() {
        fs::remove_file(&request.output)?;
    }

    let track = prepare_subtitles(request);
    let temp = write_subtitle_temp(&track)?;
    let subtitle_path = temp.path().to_path_buf();

    let status = run_passes(request, cancel, log, &subtitle_path, on_progress);
    finalize(temp, &subtitle_path, log);
    status
}

/// Preparing: resample everything when the geometry changes; otherwise
/// honor a requested font-size override on the Default style only.
fn prepare_subtitles(request: &EncodeRequest) -> SubtitleTrack {
    let mut track = request.subtitles.clone();
    if request.resizes() {
        let (sw, sh) = (request.source.width, request.source.height);
        let (tw, th) = (
            even_dimension(request.target_width),
            even_dimension(request.target_height),
        );
        track.map_styles(|style| {
            style.margin_left = resample::resample(sw, tw, style.margin_left);
            style.margin_right = resample::resample(sw, tw, style.margin_right);
            style.margin_vertical = resample::resample(sh, th, style.margin_vertical);
            style.font_size = resample::resample_f(sh, th, style.font_size).round();
            style.outline_width = resample::resample_f(sh, th, style.outline_width);
            style.shadow_width = resample::resample_f(sh, th, style.shadow_width);
            style.letter_spacing = resample::resample_f(sw, tw, style.letter_spacing);
        });
        track.set_script_info("PlayResX", &tw.to_string());
        track.set_script_info("PlayResY", &th.to_string());
        let ratio = ResampleRatio {
            source_width: sw,
            target_width: tw,
            source_height: sh,
            target_height: th,
        };
        for paragraph in &mut track.events {
            paragraph.text = resample::resample_override_tags(ratio, &paragraph.text);
        }
    } else if let Some(size) = request.font_size {
        track.set_default_font_size(size);
    }
    track
}

fn write_subtitle_temp(track: &SubtitleTrack) -> Result<NamedTempFile, EncodeError> {
    let mut temp = tempfile::Builder::new()
        .prefix("subburn-")
        .suffix(".ass")
        .tempfile()?;
    temp.write_all(track.to_ass().as_bytes())?;
    temp.flush()?;
    Ok(temp)
}

fn run_passes(
    request: &EncodeRequest,
    cancel: &Arc<AtomicBool>,
    log: &EncodeLog,
    subtitle_path: &Path,
    on_progress: &mut impl FnMut(&ProgressUpdate),
) -> Result<EncodeStatus, EncodeError> {
    if cancel.load(Ordering::Acquire) {
        log.append_line("encode canceled before the first pass");
        return Ok(EncodeStatus::Canceled);
    }

    let program = request.ffmpeg_program();
    let mut progress = ProgressState::new(request.source.total_frames());

    if let Some(target_mib) = request.target_size_mib {
        // Two explicit reservation branches: copied audio claims measured
        // MiB, re-encoded audio subtracts its known bitrate.
        let (reserved_mib, reencoded_kbps) = if request.audio_codec.is_copy() {
            let mib = measure_audio_size_mib(&program, &request.input);
            log.append_line(&format!("Audio size probe: {} MiB reserved", mib));
            (mib, None)
        } else {
            (0.0, Some(request.audio_bitrate_kbps))
        };
        let kbps = two_pass_video_kbps(
            target_mib,
            reserved_mib,
            request.source.duration_seconds,
            reencoded_kbps,
        )?;
        log.append_line(&format!("Two-pass video bitrate: {}k", kbps));

        for pass in [1u8, 2] {
            let plan = PassPlan::new(request, subtitle_path, Some(pass), Some(kbps));
            log.append_line(&format!("ffmpeg arguments pass {}: {}", pass, plan.args.join(" ")));
            match run_one_pass(&program, &plan, log, cancel, &mut progress, on_progress) {
                PassOutcome::Completed => {}
                PassOutcome::Killed => return Ok(EncodeStatus::Canceled),
                PassOutcome::Failed(reason) => return Ok(EncodeStatus::Failed(reason)),
            }
        }
    } else {
        let plan = PassPlan::new(request, subtitle_path, None, None);
        log.append_line(&format!("ffmpeg arguments: {}", plan.args.join(" ")));
        match run_one_pass(&program, &plan, log, cancel, &mut progress, on_progress) {
            PassOutcome::Completed => {}
            PassOutcome::Killed => return Ok(EncodeStatus::Canceled),
            PassOutcome::Failed(reason) => return Ok(EncodeStatus::Failed(reason)),
        }
    }

    Ok(EncodeStatus::Succeeded)
}

fn run_one_pass(
    program: &Path,
    plan: &PassPlan,
    log: &EncodeLog,
    cancel: &Arc<AtomicBool>,
    progress: &mut ProgressState,
    on_progress: &mut impl FnMut(&ProgressUpdate),
) -> PassOutcome {
    progress.begin_pass();
    let runner = PassRunner::new(
        program.to_path_buf(),
        plan.args.clone(),
        log.clone(),
        cancel.clone(),
    );
    runner.run(&mut |frames| {
        progress.update(frames);
        on_progress(&ProgressUpdate {
            frames_processed: progress.processed_frames(),
            total_frames: progress.total_frames(),
            time_remaining: progress.remaining().map(format_remaining),
        });
    })
}

/// Finalizing: the temp subtitle file and any pass-stats leftovers go away
/// on every exit path. Removal problems are logged, never fatal.
fn finalize(temp: NamedTempFile, subtitle_path: &Path, log: &EncodeLog) {
    let stats_prefix = pass_log_prefix(subtitle_path);
    for suffix in ["-0.log", "-0.log.mbtree"] {
        let mut name = stats_prefix.as_os_str().to_os_string();
        name.push(suffix);
        let path = PathBuf::from(name);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                log.append_line(&format!("could not remove pass stats {}: {}", path.display(), e));
            }
        }
    }
    if let Err(e) = temp.close() {
        let line = format!("could not remove temp subtitle file: {}", e);
        log::warn!("{}", line);
        log.append_line(&line);
    }
}
