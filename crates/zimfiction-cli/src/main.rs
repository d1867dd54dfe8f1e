//! CLI adapter for the zimfiction build stage (spec.md §6.4).
//!
//! A `clap::Parser` derive struct plus a unit-struct `Reporter`
//! implementation over `eprintln!`. This binary never returns `Result`
//! from `main` — §6.4 pins four exact exit codes (`0`/`1`/`2`/`130`), so
//! every path calls `std::process::exit` explicitly instead of relying
//! on the implicit `0`/`1` a bare `fn main() -> Result<()>` would give.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::{Deserialize, Serialize};
use zimfiction_core::context::BuildContext;
use zimfiction_core::options::BuildOptions;
use zimfiction_core::run_build;
use zimfiction_progress::Reporter;
use zimfiction_store::{EntityStore, InMemoryStore};
use zimfiction_types::{Series, Story};

/// `build [--threaded] [--workers N] [--log-directory PATH]
/// [--memprofile-directory PATH] [--no-external-links]
/// [--debug-skip-stories N] <store-url> <output.zim>` (§6.4).
#[derive(Parser, Debug)]
#[command(name = "zimfiction-build", version)]
#[command(about = "Builds a browsable offline ZIM file from a fanfiction archive dump")]
struct Cli {
    /// Opaque entity-store connection string (§6.1). Recognizes a
    /// `file://` or bare path to a JSON dump; any other scheme is
    /// rejected as this build of the CLI carries no relational-store
    /// driver.
    store_url: String,

    /// Destination `.zim` file.
    output: PathBuf,

    /// Use more render worker threads than the default (physical cores
    /// minus one). `--threaded` alone just confirms the thread-based
    /// worker pool this crate always uses; `--workers` picks the count.
    #[arg(long)]
    threaded: bool,

    /// Number of render worker threads.
    #[arg(long = "workers")]
    workers: Option<usize>,

    /// Directory for the JSONL event log and the final receipt.
    #[arg(long = "log-directory")]
    log_directory: Option<PathBuf>,

    /// Directory for per-phase memory-accounting snapshots.
    #[arg(long = "memprofile-directory")]
    memprofile_directory: Option<PathBuf>,

    /// Strip `<a>` elements whose target leaves the ZIM.
    #[arg(long = "no-external-links")]
    no_external_links: bool,

    /// Cap the per-story phase after N stories, for fast local iteration.
    #[arg(long = "debug-skip-stories")]
    debug_skip_stories: Option<usize>,
}

/// The whole-dump-in-memory JSON shape a `file://`/bare-path `store-url`
/// is expected to hold, mirroring [`InMemoryStore`]'s constructor
/// arguments — the only store backend this crate ships, since the real
/// relational store is an external collaborator (§6.1).
#[derive(Debug, Serialize, Deserialize)]
struct StoreDump {
    stories: Vec<Story>,
    #[serde(default)]
    series: Vec<Series>,
}

fn open_store(store_url: &str) -> anyhow::Result<Arc<dyn EntityStore>> {
    let path = store_url.strip_prefix("file://").unwrap_or(store_url);
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("failed to read store dump {path:?}: {e}"))?;
    let dump: StoreDump = serde_json::from_slice(&bytes)
        .map_err(|e| anyhow::anyhow!("failed to parse store dump {path:?}: {e}"))?;
    Ok(Arc::new(InMemoryStore::new(dump.stories, dump.series)))
}

struct CliReporter;

impl Reporter for CliReporter {
    fn info(&self, message: &str) {
        eprintln!("[info] {message}");
    }

    fn warn(&self, message: &str) {
        eprintln!("[warn] {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("[error] {message}");
    }
}

fn main() {
    let cli = Cli::parse();

    let store = match open_store(&cli.store_url) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("[error] invalid store-url {:?}: {e}", cli.store_url);
            std::process::exit(2);
        }
    };

    let mut options = BuildOptions::new(cli.store_url.clone(), cli.output.clone());
    options.threaded = cli.threaded;
    if let Some(workers) = cli.workers {
        if workers == 0 {
            eprintln!("[error] --workers must be at least 1");
            std::process::exit(2);
        }
        options.render_workers = workers;
    }
    options.log_directory = cli.log_directory;
    options.memprofile_directory = cli.memprofile_directory;
    options.no_external_links = cli.no_external_links;
    options.debug_skip_stories = cli.debug_skip_stories;

    let ctx = BuildContext::new(options, Arc::new(CliReporter));

    match run_build(store, &ctx) {
        Ok(outcome) => {
            eprintln!(
                "[info] build finished in {}ms: {} content records, {} redirects, {} deduped, {} bytes",
                outcome.duration_ms,
                outcome.summary.content_records,
                outcome.summary.redirect_records,
                outcome.summary.deduped_records,
                outcome.summary.bytes_written,
            );
            eprintln!(
                "[info] {} stories skipped, {} artifacts failed, {} artifacts written",
                outcome.counters.stories_skipped, outcome.counters.artifacts_failed, outcome.counters.artifacts_written
            );
            std::process::exit(0);
        }
        Err(e) => {
            let code = e.exit_code();
            eprintln!("[error] build failed: {e}");
            std::process::exit(code);
        }
    }
}
