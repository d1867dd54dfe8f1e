//! `BuildOptions`: every build-stage tunable in one plain struct,
//! threaded through a [`crate::context::BuildContext`] rather than read
//! from process-wide globals.

use std::path::PathBuf;

/// One build invocation's complete configuration (§6.4 CLI flags).
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Opaque connection string for the entity store (§6.1).
    pub store_url: String,
    /// Destination `.zim` file.
    pub output_path: PathBuf,
    /// Render worker pool size. Default: physical cores minus one (§5).
    pub render_workers: usize,
    /// `--threaded`: use OS threads for render workers instead of the
    /// default (process-isolated) tier. See `DESIGN.md` for how this
    /// crate represents that distinction.
    pub threaded: bool,
    /// `--log-directory`: where the JSONL event log and final counters
    /// are written, if set.
    pub log_directory: Option<PathBuf>,
    /// `--memprofile-directory`: where per-phase memory-accounting
    /// snapshots are written, if set (§3).
    pub memprofile_directory: Option<PathBuf>,
    /// `--no-external-links` (§3): strip `<a>` elements
    /// whose target is not a same-ZIM path.
    pub no_external_links: bool,
    /// `--debug-skip-stories` (§3): caps the per-story
    /// phase's story stream after N entries; later phases only touch
    /// entities reachable from the truncated set.
    pub debug_skip_stories: Option<usize>,
}

impl BuildOptions {
    /// The spec's default render worker count: physical cores minus one,
    /// clamped to at least one (§5).
    pub fn default_render_workers() -> usize {
        num_cpus::get_physical().saturating_sub(1).max(1)
    }

    pub fn new(store_url: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            store_url: store_url.into(),
            output_path: output_path.into(),
            render_workers: Self::default_render_workers(),
            threaded: false,
            log_directory: None,
            memprofile_directory: None,
            no_external_links: false,
            debug_skip_stories: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_render_workers_is_at_least_one() {
        assert!(BuildOptions::default_render_workers() >= 1);
    }

    #[test]
    fn new_fills_in_spec_defaults() {
        let opts = BuildOptions::new("sqlite://dump.db", "/tmp/out.zim");
        assert!(!opts.threaded);
        assert!(opts.log_directory.is_none());
        assert!(opts.debug_skip_stories.is_none());
    }
}
