//! `BuildContext` (§9: "Global mutable state ... is encapsulated in a
//! `BuildContext` value passed into every worker; no process-wide
//! singletons"): the build's options, reporter, counters, cancellation
//! flag and durable event log, all owned by one value instead of statics.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use zimfiction_events::{
    BuildCounters, BuildEventKind, BuildEventLog, MemProfileSnapshot, Phase, memprofile_path,
};
use zimfiction_progress::Reporter;

use crate::options::BuildOptions;

/// Everything a running build shares across phases and workers.
pub struct BuildContext {
    pub options: BuildOptions,
    pub reporter: Arc<dyn Reporter>,
    pub counters: Arc<Mutex<BuildCounters>>,
    pub cancel: Arc<AtomicBool>,
    events: Mutex<BuildEventLog>,
}

impl BuildContext {
    pub fn new(options: BuildOptions, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            options,
            reporter,
            counters: Arc::new(Mutex::new(BuildCounters::new())),
            cancel: Arc::new(AtomicBool::new(false)),
            events: Mutex::new(BuildEventLog::new()),
        }
    }

    /// Installs a SIGINT handler that flips [`Self::cancel`] (§5: "a
    /// SIGINT or equivalent signal cancels the build ... in-flight jobs
    /// run to completion"). Safe to call at most once per process; a
    /// second installation attempt is ignored rather than propagated,
    /// since tests commonly construct more than one `BuildContext`.
    pub fn install_signal_handler(&self) {
        let cancel = Arc::clone(&self.cancel);
        let _ = ctrlc::set_handler(move || {
            cancel.store(true, Ordering::SeqCst);
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn record_event(&self, kind: BuildEventKind) {
        self.events.lock().unwrap().record(kind);
    }

    pub fn phase_started(&self, phase: Phase) {
        let templates: Vec<&str> = crate::registry::TemplateId::for_phase(phase)
            .iter()
            .map(|t| t.label())
            .collect();
        self.reporter.info(&format!(
            "starting phase {phase:?} ({})",
            templates.join(", ")
        ));
        self.record_event(BuildEventKind::PhaseStarted { phase });
    }

    pub fn phase_finished(&self, phase: Phase) {
        self.reporter.info(&format!("finished phase {phase:?}"));
        self.record_event(BuildEventKind::PhaseFinished { phase });
    }

    /// Flushes every event recorded so far to `--log-directory`, if
    /// configured. Called at phase boundaries so a killed build still
    /// leaves a log of what happened up to that point.
    pub fn flush_events(&self) -> anyhow::Result<()> {
        let Some(dir) = &self.options.log_directory else {
            return Ok(());
        };
        let mut events = self.events.lock().unwrap();
        let path = zimfiction_events::events_path(dir);
        events.write_to_file(&path)?;
        events.clear();
        Ok(())
    }

    /// Writes a `--memprofile-directory` snapshot for the given phase, if
    /// configured (§3).
    pub fn write_memprofile(
        &self,
        phase: Phase,
        memory: zimfiction_aggregator::MemoryProfile,
    ) -> anyhow::Result<()> {
        let Some(dir) = &self.options.memprofile_directory else {
            return Ok(());
        };
        let snapshot = MemProfileSnapshot {
            timestamp: chrono::Utc::now(),
            phase,
            interned_strings: memory.interned_strings,
            author_scopes: memory.author_scopes,
            publisher_scopes: memory.publisher_scopes,
            tag_scopes: memory.tag_scopes,
            category_scopes: memory.category_scopes,
        };
        zimfiction_events::write_memprofile_snapshot(&memprofile_path(dir), &snapshot)
    }

    pub fn counters_snapshot(&self) -> BuildCounters {
        *self.counters.lock().unwrap()
    }
}

/// Writes the final build summary receipt (§3) into
/// `--log-directory`, if configured. The receipt is written unconditionally
/// on success, failure, or cancellation — it's the one "did it work" file
/// an operator checks after a long build.
pub fn write_receipt(
    log_directory: Option<&Path>,
    exit_code: i32,
    duration_ms: u64,
    counters: BuildCounters,
) -> anyhow::Result<()> {
    let Some(dir) = log_directory else { return Ok(()) };
    std::fs::create_dir_all(dir)?;
    let receipt = zimfiction_events::BuildReceipt {
        exit_code,
        duration_ms,
        counters,
        events_path: Some(
            zimfiction_events::events_path(dir)
                .to_string_lossy()
                .into_owned(),
        ),
    };
    std::fs::write(dir.join("receipt.json"), receipt.to_json_vec()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::BuildOptions;
    use zimfiction_progress::NullReporter;

    #[test]
    fn fresh_context_is_not_cancelled() {
        let ctx = BuildContext::new(
            BuildOptions::new("memory://", "/tmp/out.zim"),
            Arc::new(NullReporter),
        );
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn flush_events_without_log_directory_is_a_noop() {
        let ctx = BuildContext::new(
            BuildOptions::new("memory://", "/tmp/out.zim"),
            Arc::new(NullReporter),
        );
        ctx.record_event(BuildEventKind::Cancelled);
        assert!(ctx.flush_events().is_ok());
    }

    #[test]
    fn flush_events_writes_to_configured_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = BuildOptions::new("memory://", "/tmp/out.zim");
        opts.log_directory = Some(dir.path().to_path_buf());
        let ctx = BuildContext::new(opts, Arc::new(NullReporter));

        ctx.record_event(BuildEventKind::PhaseStarted { phase: Phase::Global });
        ctx.flush_events().unwrap();

        let loaded = BuildEventLog::read_from_file(&zimfiction_events::events_path(dir.path())).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn write_receipt_without_directory_is_a_noop() {
        assert!(write_receipt(None, 0, 10, BuildCounters::new()).is_ok());
    }

    #[test]
    fn write_receipt_creates_the_receipt_file() {
        let dir = tempfile::tempdir().unwrap();
        write_receipt(Some(dir.path()), 0, 42, BuildCounters::new()).unwrap();
        assert!(dir.path().join("receipt.json").exists());
    }
}
