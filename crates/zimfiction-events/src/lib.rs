//! # Build event log
//!
//! An append-only JSONL record of what happened during a build (§7), plus
//! the per-stage counters the CLI prints and the receipt writer embeds on
//! completion: one flat `BuildEvent` enum, one `BuildEventLog` that
//! appends in JSONL, a stable file name under `--log-directory`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default event log file name under `--log-directory`.
pub const EVENTS_FILE: &str = "events.jsonl";

/// Default memory-profile snapshot file name under `--memprofile-directory`.
pub const MEMPROFILE_FILE: &str = "memprofile.jsonl";

/// The six job-planner phases (§4.1), in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PerStory,
    PerAuthor,
    PerSeries,
    PerCategoryOrTag,
    PerPublisher,
    Global,
}

impl Phase {
    /// All phases in the order the planner runs them.
    pub const ALL: [Phase; 6] = [
        Phase::PerStory,
        Phase::PerAuthor,
        Phase::PerSeries,
        Phase::PerCategoryOrTag,
        Phase::PerPublisher,
        Phase::Global,
    ];
}

/// One entry of the build event log (§7: drop-and-count policy for
/// `InputCorruption`/`RenderError`; fatal/cancellation events for the rest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildEventKind {
    PhaseStarted { phase: Phase },
    PhaseFinished { phase: Phase },
    StorySkipped { publisher: String, story_id: u64, reason: String },
    ArtifactFailed { path: String, reason: String },
    ArtifactWritten { path: String, bytes: u64 },
    Cancelled,
    BuildFailed { reason: String },
    BuildFinished { duration_ms: u64 },
}

/// A timestamped [`BuildEventKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: BuildEventKind,
}

impl BuildEvent {
    pub fn now(kind: BuildEventKind) -> Self {
        Self { timestamp: Utc::now(), kind }
    }
}

/// Path to the event log file under a `--log-directory`.
pub fn events_path(log_dir: &Path) -> PathBuf {
    log_dir.join(EVENTS_FILE)
}

/// Path to the memory-profile snapshot file under a `--memprofile-directory`.
pub fn memprofile_path(memprofile_dir: &Path) -> PathBuf {
    memprofile_dir.join(MEMPROFILE_FILE)
}

/// Append-only in-memory event log, flushed to disk in JSONL.
#[derive(Debug, Default)]
pub struct BuildEventLog {
    events: Vec<BuildEvent>,
}

impl BuildEventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, kind: BuildEventKind) {
        self.events.push(BuildEvent::now(kind));
    }

    /// Appends every recorded event to `path` in JSONL, creating parent
    /// directories as needed. Safe to call repeatedly across phases: each
    /// call appends only the events recorded since the last flush if the
    /// caller drains via [`Self::take`] between calls.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log dir {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open events file {}", path.display()))?;

        let mut writer = std::io::BufWriter::new(file);
        for event in &self.events {
            let line = serde_json::to_string(event).context("failed to serialize event")?;
            writeln!(writer, "{line}").context("failed to write event line")?;
        }
        writer.flush().context("failed to flush events file")?;
        Ok(())
    }

    pub fn read_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let file = File::open(path)
            .with_context(|| format!("failed to open events file {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line.context("failed to read events file line")?;
            let event: BuildEvent = serde_json::from_str(&line)
                .with_context(|| format!("failed to parse event JSON from line: {line}"))?;
            events.push(event);
        }
        Ok(Self { events })
    }

    pub fn all_events(&self) -> &[BuildEvent] {
        &self.events
    }

    /// Drains every buffered event, returning them for the caller to flush.
    pub fn take(&mut self) -> Vec<BuildEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// The per-stage counters §7 requires, reported at the end of a build and
/// written to the log directory if configured.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildCounters {
    pub stories_skipped: u64,
    pub artifacts_failed: u64,
    pub artifacts_written: u64,
    pub bytes_written: u64,
}

impl BuildCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commutative merge: counters from independent workers can be summed
    /// in any order.
    pub fn merge(&mut self, other: &BuildCounters) {
        self.stories_skipped += other.stories_skipped;
        self.artifacts_failed += other.artifacts_failed;
        self.artifacts_written += other.artifacts_written;
        self.bytes_written += other.bytes_written;
    }
}

/// A coarse, inspectable memory-accounting snapshot written at each phase
/// boundary under `--memprofile-directory` (§3). Not a real
/// allocator profile — a structured record of what the aggregator is
/// currently holding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemProfileSnapshot {
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
    pub interned_strings: usize,
    pub author_scopes: usize,
    pub publisher_scopes: usize,
    pub tag_scopes: usize,
    pub category_scopes: usize,
}

/// Appends one snapshot line to `path` (JSONL, one object per phase
/// boundary), creating parent directories as needed.
pub fn write_memprofile_snapshot(path: &Path, snapshot: &MemProfileSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create memprofile dir {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open memprofile file {}", path.display()))?;
    let mut writer = std::io::BufWriter::new(file);
    let line = serde_json::to_string(snapshot).context("failed to serialize memprofile snapshot")?;
    writeln!(writer, "{line}").context("failed to write memprofile line")?;
    writer.flush().context("failed to flush memprofile file")?;
    Ok(())
}

/// The single build summary artifact written on completion, success or
/// failure (§3's "Build summary receipt").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildReceipt {
    pub exit_code: i32,
    pub duration_ms: u64,
    pub counters: BuildCounters,
    pub events_path: Option<String>,
}

impl BuildReceipt {
    pub fn to_json_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).context("failed to serialize build receipt")
    }
}
