//! Frame-counter scraping from encoder diagnostics, and the linear
//! remaining-time estimate derived from it.

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

static FRAME_FINDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[Ff]rame=\s*(\d+)").unwrap());

/// Pull the frames-encoded counter out of one diagnostic line. Stateless;
/// lines without a counter (or with garbage after the `=`) yield None.
pub fn parse_frame_count(line: &str) -> Option<u64> {
    FRAME_FINDER
        .captures(line)
        .and_then(|caps| caps[1].parse().ok())
}

/// Progress of the pass currently running. Frames only ever increase within
/// a pass; `begin_pass` resets both the counter and the clock.
#[derive(Debug)]
pub struct ProgressState {
    processed_frames: u64,
    total_frames: u64,
    pass_started: Instant,
}

impl ProgressState {
    pub fn new(total_frames: u64) -> Self {
        ProgressState {
            processed_frames: 0,
            total_frames,
            pass_started: Instant::now(),
        }
    }

    pub fn begin_pass(&mut self) {
        self.processed_frames = 0;
        self.pass_started = Instant::now();
    }

    /// Monotonic: a stale, lower reading never moves the counter back.
    pub fn update(&mut self, frames: u64) {
        self.processed_frames = self.processed_frames.max(frames);
    }

    pub fn processed_frames(&self) -> u64 {
        self.processed_frames
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Linear extrapolation from frames done and elapsed wall time. None
    /// until at least one frame is counted.
    pub fn remaining(&self) -> Option<Duration> {
        if self.processed_frames == 0 || self.total_frames == 0 {
            return None;
        }
        let elapsed_ms = self.pass_started.elapsed().as_secs_f64() * 1000.0;
        let ms_per_frame = elapsed_ms / self.processed_frames as f64;
        let estimated_total_ms = ms_per_frame * self.total_frames as f64;
        Some(Duration::from_secs_f64(
            (estimated_total_ms - elapsed_ms).max(0.0) / 1000.0,
        ))
    }
}

/// Remaining-time text: seconds under a minute, bare minutes past five
/// minutes, minutes and seconds in between.
pub fn format_remaining(remaining: Duration) -> String {
    let total_seconds = remaining.as_secs_f64();
    if total_seconds < 60.0 {
        return format!("{} seconds remaining", total_seconds.round() as u64);
    }
    if total_seconds / 60.0 > 5.0 {
        return format!("{} minutes remaining", (total_seconds / 60.0).round() as u64);
    }
    let whole = remaining.as_secs();
    format!("{} minutes {} seconds remaining", whole / 60, whole % 60)
}
