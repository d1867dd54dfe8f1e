//! # zimfiction-core
//!
//! Build orchestration for the zimfiction build stage (spec.md §4):
//! wires the [`crate::planner::JobPlanner`], the entity adapters in
//! [`crate::pages`], the render worker pool (`zimfiction-render`), the
//! Aggregator/Reducer (`zimfiction-aggregator`), the search-index emitter
//! (`zimfiction-search-index`), and the ZIM writer (`zimfiction-zim`)
//! into the six ordered phases of §4.1, each a hard barrier: every job of
//! phase *N* completes (or the build aborts) before phase *N+1* starts,
//! since later phases read aggregator state phase *N* produced.

pub mod context;
pub mod errors;
pub mod options;
pub mod pages;
pub mod phase;
pub mod planner;
pub mod registry;

use std::sync::Arc;
use std::time::Instant;

use zimfiction_events::Phase;
use zimfiction_search_index::SearchIndexOptions;
use zimfiction_store::EntityStore;
use zimfiction_zim::{ZimSummary, ZimWriter};

use crate::context::{BuildContext, write_receipt};
use crate::errors::BuildError;
use crate::options::BuildOptions;
use crate::phase::run_phase;
use crate::planner::JobPlanner;

/// Everything a successful build reports back to its caller (§6.4's "a
/// summary of what happened").
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub summary: ZimSummary,
    pub counters: zimfiction_events::BuildCounters,
    pub duration_ms: u64,
}

/// Runs one complete build: every phase of §4.1 in order, against a
/// freshly opened [`ZimWriter`]. On any phase's failure the partial ZIM
/// file is discarded (`ZimWriter::abort`) and a `--log-directory` receipt
/// is still written, recording the failing exit code (§5, §7).
pub fn run_build(store: Arc<dyn EntityStore>, ctx: &BuildContext) -> Result<BuildOutcome, BuildError> {
    let start = Instant::now();
    ctx.install_signal_handler();

    let result = run_build_inner(store, ctx);

    let duration_ms = start.elapsed().as_millis() as u64;
    let exit_code = match &result {
        Ok(_) => 0,
        Err(e) => e.exit_code(),
    };
    let _ = write_receipt(ctx.options.log_directory.as_deref(), exit_code, duration_ms, ctx.counters_snapshot());

    result.map(|summary| BuildOutcome { summary, counters: ctx.counters_snapshot(), duration_ms })
}

fn run_build_inner(store: Arc<dyn EntityStore>, ctx: &BuildContext) -> Result<ZimSummary, BuildError> {
    let mut writer = ZimWriter::create(&ctx.options.output_path).map_err(BuildError::from)?;

    match run_all_phases(&store, ctx, &mut writer) {
        Ok(()) => writer.finish().map_err(BuildError::from),
        Err(e) => {
            writer.abort();
            Err(e)
        }
    }
}

fn run_all_phases(store: &Arc<dyn EntityStore>, ctx: &BuildContext, writer: &mut ZimWriter) -> Result<(), BuildError> {
    let planner = JobPlanner::new(Arc::clone(store));
    let search_options = SearchIndexOptions::default();

    // Phase 1 (PerStory): streams lazily off the store; its snapshot is
    // the only source of truth for every later phase's entity set.
    let story_snapshot = run_phase(ctx, Phase::PerStory, planner.story_jobs(ctx.options.debug_skip_stories), writer)?;
    let story_snapshot = Arc::new(story_snapshot);

    if ctx.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    // Built once, shared by phase 4's tag and category jobs, since series
    // membership is not derivable from a story's own fields.
    let series_index = Arc::new(pages::build_series_index(store.as_ref())?);

    // Phase 2 (PerAuthor)
    let author_jobs = pages::author_jobs(store, &story_snapshot)?;
    run_phase(ctx, Phase::PerAuthor, author_jobs.into_iter().map(Ok), writer)?;

    if ctx.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    // Phase 3 (PerSeries): enumerated directly from the store, not from
    // the phase-1 snapshot.
    let series_jobs = pages::series_jobs(store)?;
    run_phase(ctx, Phase::PerSeries, series_jobs.into_iter().map(Ok), writer)?;

    if ctx.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    // Phase 4 (PerCategoryOrTag): tags and categories share a phase
    // (§4.1) since neither depends on the other's output.
    let mut tag_and_category_jobs = pages::tag_jobs(store, &story_snapshot, &series_index, search_options)?;
    tag_and_category_jobs.extend(pages::category_jobs(store, &story_snapshot, &series_index, search_options)?);
    run_phase(ctx, Phase::PerCategoryOrTag, tag_and_category_jobs.into_iter().map(Ok), writer)?;

    if ctx.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    // Phase 5 (PerPublisher)
    let publisher_jobs = pages::publisher_jobs(store, &story_snapshot)?;
    run_phase(ctx, Phase::PerPublisher, publisher_jobs.into_iter().map(Ok), writer)?;

    if ctx.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    // Phase 6 (Global): root redirect, landing pages, static assets.
    let global_jobs = pages::global_jobs(&story_snapshot);
    run_phase(ctx, Phase::Global, global_jobs.into_iter().map(Ok), writer)?;

    Ok(())
}
