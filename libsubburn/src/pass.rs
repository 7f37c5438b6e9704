//! Supervision of one encoder invocation: spawn, pump diagnostics, poll for
//! exit or cancellation, kill on cancel.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::progress::parse_frame_count;

/// How often the runner checks for process exit and cancellation. A cancel
/// request takes effect within one interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cumulative diagnostic log for one job. One writer (the stream pump),
/// any number of snapshot readers; readers get a copy, never a lock held
/// across rendering.
#[derive(Clone, Default)]
pub struct EncodeLog {
    inner: Arc<Mutex<String>>,
}

impl EncodeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_line(&self, line: &str) {
        let mut log = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        log.push_str(line);
        log.push('\n');
    }

    pub fn snapshot(&self) -> String {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Terminal state of one pass.
#[derive(Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// Process exited with a zero status.
    Completed,
    /// Cancellation was observed and the process was terminated.
    Killed,
    /// Launch failed or the process exited non-zero; the reason is also in
    /// the log.
    Failed(String),
}

pub struct PassRunner {
    program: PathBuf,
    args: Vec<String>,
    log: EncodeLog,
    cancel: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl PassRunner {
    pub fn new(program: PathBuf, args: Vec<String>, log: EncodeLog, cancel: Arc<AtomicBool>) -> Self {
        PassRunner { program, args, log, cancel, poll_interval: POLL_INTERVAL }
    }

    #[cfg(test)]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run the pass to a terminal state. `on_frames` is called once per poll
    /// tick with the latest frame count scraped from the diagnostics.
    pub fn run(&self, on_frames: &mut dyn FnMut(u64)) -> PassOutcome {
        let mut child = match Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let reason = format!("failed to launch {}: {}", self.program.display(), e);
                log::error!("{}", reason);
                self.log.append_line(&reason);
                return PassOutcome::Failed(reason);
            }
        };

        let frames = Arc::new(AtomicU64::new(0));
        let mut pumps: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(self.spawn_pump(stdout, frames.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(self.spawn_pump(stderr, frames.clone()));
        }

        let outcome = loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        break PassOutcome::Completed;
                    }
                    let reason = format!("encoder exited with {}", status);
                    self.log.append_line(&reason);
                    break PassOutcome::Failed(reason);
                }
                Ok(None) => {}
                Err(e) => {
                    let reason = format!("lost track of encoder process: {}", e);
                    self.log.append_line(&reason);
                    let _ = child.kill();
                    let _ = child.wait();
                    break PassOutcome::Failed(reason);
                }
            }

            if self.cancel.load(Ordering::Acquire) {
                log::info!("cancellation requested, killing encoder");
                kill_and_reap(&mut child);
                self.log.append_line("encode canceled, encoder process killed");
                break PassOutcome::Killed;
            }

            on_frames(frames.load(Ordering::Acquire));
            thread::sleep(self.poll_interval);
        };

        // The pumps drain to EOF on their own once the process is gone; no
        // reads happen against a killed process beyond that.
        for pump in pumps {
            let _ = pump.join();
        }
        on_frames(frames.load(Ordering::Acquire));
        outcome
    }

    fn spawn_pump<R: Read + Send + 'static>(&self, stream: R, frames: Arc<AtomicU64>) -> JoinHandle<()> {
        let log = self.log.clone();
        thread::spawn(move || {
            for line in BufReader::new(stream).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(_) => break,
                };
                if line.trim().is_empty() {
                    continue;
                }
                log.append_line(&line);
                if let Some(count) = parse_frame_count(&line) {
                    frames.fetch_max(count, Ordering::AcqRel);
                }
            }
        })
    }
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("failed to kill encoder: {}", e);
    }
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use std::time::Instant;

    fn write_script(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-encoder.sh");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{}", body).unwrap();
        let mut perms = file.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn completed_pass_reports_frames_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "echo 'frame=  10 fps=25' 1>&2\necho 'frame= 120 fps=25' 1>&2\nexit 0",
        );
        let log = EncodeLog::new();
        let cancel = Arc::new(AtomicBool::new(false));
        let runner = PassRunner::new(script, vec![], log.clone(), cancel)
            .with_poll_interval(Duration::from_millis(10));
        let mut last = 0;
        let outcome = runner.run(&mut |f| last = f);
        assert_eq!(outcome, PassOutcome::Completed);
        assert_eq!(last, 120);
        assert!(log.snapshot().contains("frame= 120"));
    }

    #[test]
    fn nonzero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo 'boom' 1>&2\nexit 3");
        let log = EncodeLog::new();
        let runner = PassRunner::new(script, vec![], log.clone(), Arc::new(AtomicBool::new(false)))
            .with_poll_interval(Duration::from_millis(10));
        let outcome = runner.run(&mut |_| {});
        assert_matches!(outcome, PassOutcome::Failed(_));
        assert!(log.snapshot().contains("boom"));
    }

    #[test]
    fn missing_program_is_failure_with_logged_reason() {
        let log = EncodeLog::new();
        let runner = PassRunner::new(
            PathBuf::from("/nonexistent/encoder-binary"),
            vec![],
            log.clone(),
            Arc::new(AtomicBool::new(false)),
        );
        let outcome = runner.run(&mut |_| {});
        assert_matches!(outcome, PassOutcome::Failed(_));
        assert!(log.snapshot().contains("failed to launch"));
    }

    #[test]
    fn cancellation_kills_within_a_poll_interval() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "exec sleep 30");
        let log = EncodeLog::new();
        let cancel = Arc::new(AtomicBool::new(false));
        let runner = PassRunner::new(script, vec![], log.clone(), cancel.clone())
            .with_poll_interval(Duration::from_millis(20));

        let started = Instant::now();
        cancel.store(true, Ordering::Release);
        let outcome = runner.run(&mut |_| {});
        assert_eq!(outcome, PassOutcome::Killed);
        // nowhere near the script's 30 s sleep
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn log_snapshots_are_independent_copies() {
        let log = EncodeLog::new();
        log.append_line("first");
        let snap = log.snapshot();
        log.append_line("second");
        assert_eq!(snap, "first\n");
        assert_eq!(log.snapshot(), "first\nsecond\n");
    }
}
