//! # Progress reporting
//!
//! The `Reporter` trait (info/warn/error) every worker and phase reports
//! through, and a TTY-aware `BuildProgress` that renders a bar when stdout
//! is interactive and falls back to plain `eprintln!` lines otherwise.

use std::time::Instant;

use atty::Stream;
use indicatif::{ProgressBar, ProgressStyle};
use zimfiction_events::Phase;

/// Detects whether stdout is connected to a TTY.
pub fn is_tty() -> bool {
    atty::is(Stream::Stdout)
}

/// Interactive/human output sink. The CLI implements this with
/// `eprintln!`; tests can implement it with an in-memory sink. The
/// `BuildEventLog` (see `zimfiction-events`) is the durable counterpart —
/// this trait is for humans watching a terminal, not for replay.
pub trait Reporter: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// A `Reporter` that discards everything; used by `--log-directory`-only
/// or non-interactive invocations, and by tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// TTY-aware progress display for one phase's job stream: shows a bar in
/// interactive terminals, falls back to periodic `eprintln!` lines
/// otherwise.
pub struct BuildProgress {
    is_tty: bool,
    phase: Phase,
    total_jobs: u64,
    done_jobs: u64,
    bar: Option<ProgressBar>,
    start_time: Instant,
}

impl BuildProgress {
    /// Starts tracking `phase`, expecting roughly `total_jobs` jobs (an
    /// estimate — the planner streams lazily and may undercount; the bar
    /// degrades gracefully past its declared total).
    pub fn new(phase: Phase, total_jobs: u64) -> Self {
        Self::with_tty(phase, total_jobs, is_tty())
    }

    /// Forces non-interactive mode regardless of the real stdout state;
    /// used by `--log-directory`-only runs and by tests.
    pub fn silent(phase: Phase, total_jobs: u64) -> Self {
        Self::with_tty(phase, total_jobs, false)
    }

    fn with_tty(phase: Phase, total_jobs: u64, is_tty: bool) -> Self {
        let bar = if is_tty {
            let pb = ProgressBar::new(total_jobs);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        Self {
            is_tty,
            phase,
            total_jobs,
            done_jobs: 0,
            bar,
            start_time: Instant::now(),
        }
    }

    /// Records one completed job.
    pub fn inc(&mut self) {
        self.done_jobs += 1;
        if self.is_tty {
            if let Some(ref bar) = self.bar {
                let elapsed = self.start_time.elapsed();
                bar.set_position(self.done_jobs.min(self.total_jobs));
                bar.set_message(format!(
                    "[{:?}] {}/{} jobs ({elapsed:?})",
                    self.phase, self.done_jobs, self.total_jobs
                ));
            }
        }
    }

    /// Emits a status line; in TTY mode this updates the bar's message, in
    /// plain mode it prints a line immediately.
    pub fn set_status(&self, status: &str) {
        if self.is_tty {
            if let Some(ref bar) = self.bar {
                bar.set_message(format!("[{:?}] {status}", self.phase));
            }
        } else {
            eprintln!("[{:?}] {status}", self.phase);
        }
    }

    /// Finishes this phase's progress display.
    pub fn finish(self) {
        let elapsed = self.start_time.elapsed();
        if self.is_tty {
            if let Some(bar) = self.bar {
                bar.set_message(format!(
                    "[{:?}] done: {}/{} jobs in {elapsed:?}",
                    self.phase, self.done_jobs, self.total_jobs
                ));
                bar.finish();
            }
        } else {
            eprintln!(
                "[{:?}] done: {}/{} jobs in {elapsed:?}",
                self.phase, self.done_jobs, self.total_jobs
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingReporter {
        lines: Mutex<Vec<String>>,
    }

    impl Reporter for RecordingReporter {
        fn info(&self, message: &str) {
            self.lines.lock().unwrap().push(format!("info: {message}"));
        }
        fn warn(&self, message: &str) {
            self.lines.lock().unwrap().push(format!("warn: {message}"));
        }
        fn error(&self, message: &str) {
            self.lines.lock().unwrap().push(format!("error: {message}"));
        }
    }

    #[test]
    fn is_tty_returns_a_bool() {
        let _ = is_tty();
    }

    #[test]
    fn null_reporter_discards_everything() {
        let reporter = NullReporter;
        reporter.info("x");
        reporter.warn("y");
        reporter.error("z");
    }

    #[test]
    fn recording_reporter_captures_all_levels() {
        let reporter = RecordingReporter::default();
        reporter.info("a");
        reporter.warn("b");
        reporter.error("c");
        let lines = reporter.lines.into_inner().unwrap();
        assert_eq!(lines, vec!["info: a", "warn: b", "error: c"]);
    }

    #[test]
    fn silent_progress_tracks_job_counts_without_a_tty() {
        let mut progress = BuildProgress::silent(Phase::PerStory, 3);
        assert_eq!(progress.done_jobs, 0);
        progress.inc();
        progress.inc();
        assert_eq!(progress.done_jobs, 2);
        progress.set_status("rendering");
        progress.finish();
    }

    #[test]
    fn progress_handles_more_completions_than_the_declared_total() {
        let mut progress = BuildProgress::silent(Phase::Global, 1);
        progress.inc();
        progress.inc();
        assert_eq!(progress.done_jobs, 2);
    }
}
