//! The generic phase executor (§4.1 phase barriers, §5 concurrency
//! model): wires a job stream through the render worker pool, drains
//! rendered artifacts into the [`ZimWriter`], and folds contributions
//! into a single [`Reducer`] thread, then waits for every phase
//! participant before returning the phase's sealed [`AggregatorSnapshot`].
//! Every phase in `lib.rs`'s `run_build` calls this once; only the job
//! stream and phase name differ between calls.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;

use zimfiction_aggregator::{AggregatorSnapshot, Reducer};
use zimfiction_events::Phase;
use zimfiction_render::{ArtifactQueue, Job, RenderOptions, spawn_render_workers};
use zimfiction_zim::{ZimError, ZimWriter};

use crate::context::BuildContext;
use crate::errors::BuildError;

/// Runs one phase's job stream to completion against `writer`, returning
/// the phase's sealed aggregator snapshot.
///
/// `jobs` may fail mid-stream (a [`BuildError`] from the planner); such a
/// failure is fatal and propagates once every thread has wound down
/// cleanly, rather than being surfaced the instant it occurs, so no
/// worker or writer call is left racing a dropped channel.
pub fn run_phase(
    ctx: &BuildContext,
    phase: Phase,
    jobs: impl Iterator<Item = Result<Job, BuildError>> + Send + 'static,
    writer: &mut ZimWriter,
) -> Result<AggregatorSnapshot, BuildError> {
    ctx.phase_started(phase);

    let render_workers = ctx.options.render_workers.max(1);
    let options = RenderOptions { no_external_links: ctx.options.no_external_links };

    let (job_tx, job_rx) = crossbeam_channel::bounded::<Job>(4 * render_workers);

    // `queue` itself is dropped once its sender/receiver are cloned out so
    // its own internal master handles don't keep the channel alive after
    // every worker and the drain loop below have finished with their
    // clones — otherwise `artifact_rx.iter()` would never terminate.
    let queue = ArtifactQueue::new(render_workers);
    let artifact_rx = queue.receiver();
    let artifact_tx = queue.sender();
    drop(queue);

    let (reducer, contribution_tx) = Reducer::new();
    let reducer_handle = thread::spawn(move || reducer.run());

    let worker_handles = spawn_render_workers(
        render_workers,
        job_rx,
        artifact_tx,
        contribution_tx,
        Arc::clone(&ctx.counters),
        Arc::clone(&ctx.cancel),
        options,
    );

    let plan_failure: Arc<Mutex<Option<BuildError>>> = Arc::new(Mutex::new(None));
    let feeder_cancel = Arc::clone(&ctx.cancel);
    let feeder_failure = Arc::clone(&plan_failure);
    let feeder = thread::spawn(move || {
        for job in jobs {
            if feeder_cancel.load(Ordering::Relaxed) {
                break;
            }
            match job {
                Ok(job) => {
                    if job_tx.send(job).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    *feeder_failure.lock().unwrap() = Some(e);
                    break;
                }
            }
        }
        // job_tx drops here, closing the channel once the feeder returns.
    });

    let mut write_error: Option<ZimError> = None;
    for artifact in artifact_rx.iter() {
        if write_error.is_some() {
            // A fatal write error already occurred; keep draining so
            // blocked render workers don't deadlock on a full channel,
            // but stop touching the (now untrustworthy) writer.
            continue;
        }
        if let Err(e) = writer.push(artifact) {
            write_error = Some(e);
            ctx.cancel.store(true, Ordering::SeqCst);
        }
    }

    feeder.join().expect("job feeder thread panicked");
    for handle in worker_handles {
        handle.join().expect("render worker thread panicked");
    }
    let snapshot = reducer_handle.join().expect("reducer thread panicked");

    if let Some(e) = write_error {
        return Err(BuildError::from(e));
    }
    if let Some(err) = plan_failure.lock().unwrap().take() {
        return Err(err);
    }
    if ctx.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    ctx.flush_events().map_err(BuildError::from)?;
    ctx.write_memprofile(phase, snapshot.memory_profile()).map_err(BuildError::from)?;
    ctx.phase_finished(phase);

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::BuildOptions;
    use zimfiction_progress::NullReporter;
    use zimfiction_zim::{Artifact, ArtifactHint, Mime};

    fn test_context() -> BuildContext {
        let mut options = BuildOptions::new("memory://", "/tmp/does-not-matter.zim");
        options.render_workers = 2;
        BuildContext::new(options, Arc::new(NullReporter))
    }

    #[test]
    fn run_phase_writes_every_job_and_returns_a_snapshot() {
        let ctx = test_context();
        let td = tempfile::tempdir().unwrap();
        let mut writer = ZimWriter::create(&td.path().join("out.zim")).unwrap();

        let jobs: Vec<Result<Job, BuildError>> = (0..5)
            .map(|i| {
                Ok(Job::Custom(Box::new(move |_opts| {
                    Ok(zimfiction_render::JobOutput::artifacts_only(vec![Artifact::content(
                        format!("/page/{i}"),
                        Mime::TextHtml,
                        b"<p>hi</p>".to_vec(),
                        ArtifactHint::UNIQUE,
                    )]))
                })))
            })
            .collect();

        let snapshot = run_phase(&ctx, Phase::Global, jobs.into_iter(), &mut writer).unwrap();
        assert_eq!(snapshot.global().story_count, 0);

        let summary = writer.finish().unwrap();
        assert_eq!(summary.content_records, 5);
    }

    #[test]
    fn run_phase_propagates_a_planner_failure() {
        let ctx = test_context();
        let td = tempfile::tempdir().unwrap();
        let mut writer = ZimWriter::create(&td.path().join("out.zim")).unwrap();

        let jobs: Vec<Result<Job, BuildError>> = vec![Err(BuildError::Plan(
            crate::errors::PlanError::CounterOverflow("words".into()),
        ))];

        let err = run_phase(&ctx, Phase::Global, jobs.into_iter(), &mut writer).unwrap_err();
        assert!(matches!(err, BuildError::Plan(_)));
    }

    #[test]
    fn run_phase_reports_a_duplicate_path_as_a_write_error() {
        let ctx = test_context();
        let td = tempfile::tempdir().unwrap();
        let mut writer = ZimWriter::create(&td.path().join("out.zim")).unwrap();

        let jobs: Vec<Result<Job, BuildError>> = vec![
            Ok(Job::Custom(Box::new(|_opts| {
                Ok(zimfiction_render::JobOutput::artifacts_only(vec![Artifact::content(
                    "/dup",
                    Mime::TextHtml,
                    b"one".to_vec(),
                    ArtifactHint::UNIQUE,
                )]))
            }))),
            Ok(Job::Custom(Box::new(|_opts| {
                Ok(zimfiction_render::JobOutput::artifacts_only(vec![Artifact::content(
                    "/dup",
                    Mime::TextHtml,
                    b"two".to_vec(),
                    ArtifactHint::UNIQUE,
                )]))
            }))),
        ];

        let err = run_phase(&ctx, Phase::Global, jobs.into_iter(), &mut writer).unwrap_err();
        assert!(matches!(err, BuildError::Write(_)));
    }
}
