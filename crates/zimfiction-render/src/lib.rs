//! # Render worker pool
//!
//! The bounded `ArtifactQueue` and the `RenderWorker` pool (§4.2, §5): a
//! fixed-size pool of threads pulls `Job` values from a bounded channel
//! fed by a planner, renders each into `0..K` artifacts, and pushes them
//! to a bounded `ArtifactQueue` that blocks producers once the ZIM writer
//! falls behind. Concretely implements the best-specified phase (§4.1
//! phase 1, per-story) end to end; other phases plug in through
//! [`Job::Custom`] so the same pool mechanics carry every phase without
//! this crate needing to know every entity type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use zimfiction_aggregator::Contribution;
use zimfiction_events::BuildCounters;
use zimfiction_templates::{escape, format_date, format_number, render_storytext, visible_tags_html};
use zimfiction_types::{Story, normalize};
use zimfiction_zim::{Artifact, ArtifactHint, Mime};

/// Render-time options threaded through every worker (§3).
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub no_external_links: bool,
}

/// A unit of work pulled from the job channel. `StoryPage` renders every
/// artifact for one story (chapters, index, preview, redirect) as a
/// single content-independent job (§4.1: "jobs are content-independent").
/// `Custom` lets later phases (author/series/tag/category/publisher/
/// global) reuse this pool without this crate modeling every entity.
pub enum Job {
    StoryPage { story: Arc<Story> },
    Custom(Box<dyn FnOnce(&RenderOptions) -> Result<JobOutput, RenderError> + Send>),
}

/// What a job produced: the artifacts to push to the ZIM writer, plus an
/// optional contribution to fold into the Aggregator.
pub struct JobOutput {
    pub artifacts: Vec<Artifact>,
    pub contribution: Option<Contribution>,
}

impl JobOutput {
    pub fn artifacts_only(artifacts: Vec<Artifact>) -> Self {
        Self { artifacts, contribution: None }
    }
}

/// Failures a single job can raise (§7). `InputCorruption` increments
/// `stories_skipped`; `Template` increments `artifacts_failed`. Neither is
/// fatal — the worker drops the job and continues.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("story cannot be projected: {0}")]
    InputCorruption(String),
    #[error("template expansion failed: {0}")]
    Template(String),
}

/// One preview record embedded at `/story/<publisher>/<id>/preview.json`
/// (§4.1, §8 round-trip property). Carries enough metadata to render a
/// compact story card plus the pre-rendered summary fragment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviewRecord {
    pub publisher: String,
    pub id: u64,
    pub title: String,
    pub author: String,
    pub updated: String,
    pub words: u64,
    pub chapters: u32,
    pub score: i64,
    pub rating: String,
    pub language: String,
    pub status: String,
    pub summary_html: String,
}

impl PreviewRecord {
    fn from_story(story: &Story) -> Self {
        Self {
            publisher: story.publisher.clone(),
            id: story.id,
            title: story.title.clone(),
            author: story.author_ref.name.clone(),
            updated: story.updated_date.format("%Y-%m-%d").to_string(),
            words: story.total_words(),
            chapters: story.chapter_count(),
            score: story.score,
            rating: story.display_rating(),
            language: story.language.clone(),
            status: story.status.as_str().to_string(),
            summary_html: story.summary_html.clone(),
        }
    }
}

fn story_path(story: &Story, suffix: &str) -> String {
    format!("/story/{}/{}/{}", story.publisher, story.id, suffix)
}

/// Extended card (§4.2): the full byline, summary and visible tag list
/// prepended to chapter 1's page, as opposed to the one-line compact card
/// shown in listing pages.
fn extended_card_html(story: &Story) -> String {
    let tags = visible_tags_html(story);
    let tags_html = if tags.is_empty() {
        String::new()
    } else {
        format!("<p class=\"tags\">{tags}</p>")
    };
    format!(
        "<div class=\"story-card story-card-extended\">\
         <h1>{title}</h1>\
         <p class=\"byline\">by <a href=\"/author/{publisher}/{author_slug}/1\">{author}</a></p>\
         <div class=\"summary\">{summary}</div>\
         <p class=\"stats\">{words} words, {chapters} chapters, updated {updated}</p>\
         {tags_html}</div>",
        title = escape(&story.title),
        publisher = escape(&story.publisher),
        author_slug = normalize(&story.author_ref.name),
        author = escape(&story.author_ref.name),
        summary = story.summary_html,
        words = format_number(story.total_words()),
        chapters = story.chapter_count(),
        updated = format_date(story.updated_date),
    )
}

/// Renders every artifact belonging to one story (§4.1 phase 1, §6.2
/// paths): chapter pages, the chapter-listing index, `preview.json`, and
/// the `./1` redirect.
pub fn render_story_page(story: &Story, options: &RenderOptions) -> Result<JobOutput, RenderError> {
    if story.chapters.is_empty() {
        return Err(RenderError::InputCorruption(format!(
            "story {}/{} has no chapters",
            story.publisher, story.id
        )));
    }
    if !story.has_contiguous_chapters() {
        return Err(RenderError::InputCorruption(format!(
            "story {}/{} has non-contiguous chapter indices",
            story.publisher, story.id
        )));
    }

    let mut artifacts = Vec::with_capacity(story.chapters.len() + 3);

    for chapter in &story.chapters {
        let mut body = render_storytext(&chapter.text_html, options.no_external_links);
        if chapter.index == 1 {
            body = format!("{}{}", extended_card_html(story), body);
        }
        artifacts.push(Artifact::content(
            story_path(story, &chapter.index.to_string()),
            Mime::TextHtml,
            body.into_bytes(),
            ArtifactHint::UNIQUE,
        ));
    }

    artifacts.push(Artifact::content(
        story_path(story, "index"),
        Mime::TextHtml,
        render_chapter_index(story).into_bytes(),
        ArtifactHint::UNIQUE,
    ));

    let preview = PreviewRecord::from_story(story);
    let preview_json = serde_json::to_vec(&preview)
        .map_err(|e| RenderError::Template(format!("failed to serialize preview.json: {e}")))?;
    artifacts.push(Artifact::content(
        story_path(story, "preview.json"),
        Mime::ApplicationJson,
        preview_json,
        ArtifactHint::UNIQUE,
    ));

    artifacts.push(Artifact::redirect(
        format!("/story/{}/{}/", story.publisher, story.id),
        "./1",
    ));

    Ok(JobOutput {
        artifacts,
        contribution: Some(Contribution::Story(Box::new(story.clone()))),
    })
}

fn render_chapter_index(story: &Story) -> String {
    let mut out = String::from("<ul>");
    for chapter in &story.chapters {
        out.push_str(&format!(
            "<li><a href=\"./{}\">{}</a></li>",
            chapter.index,
            zimfiction_templates::escape(&chapter.title)
        ));
    }
    out.push_str("</ul>");
    out
}

fn run_job(job: Job, options: &RenderOptions) -> Result<JobOutput, RenderError> {
    match job {
        Job::StoryPage { story } => render_story_page(&story, options),
        Job::Custom(f) => f(options),
    }
}

/// Bounded channel of rendered artifacts, capacity `4 * render_workers`
/// (§5's backpressure mechanism: renderers block rather than unboundedly
/// buffer).
pub struct ArtifactQueue {
    tx: Sender<Artifact>,
    rx: Receiver<Artifact>,
}

impl ArtifactQueue {
    pub fn new(render_workers: usize) -> Self {
        let capacity = (4 * render_workers.max(1)).max(1);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<Artifact> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<Artifact> {
        self.rx.clone()
    }
}

/// Spawns `render_workers` threads, each pulling jobs from `job_rx` until
/// the channel closes or `cancel` is set, pushing rendered artifacts to
/// `artifact_tx` and contributions to `contribution_tx`. Failures on a
/// single job are logged and dropped (§7); workers never panic the pool.
///
/// Returns the spawned handles; callers `join` them after closing
/// `job_rx`'s sender side (signals "no more jobs").
pub fn spawn_render_workers(
    render_workers: usize,
    job_rx: Receiver<Job>,
    artifact_tx: Sender<Artifact>,
    contribution_tx: std::sync::mpsc::Sender<Contribution>,
    counters: Arc<Mutex<BuildCounters>>,
    cancel: Arc<AtomicBool>,
    options: RenderOptions,
) -> Vec<thread::JoinHandle<()>> {
    let contribution_tx = Arc::new(Mutex::new(contribution_tx));

    (0..render_workers.max(1))
        .map(|_| {
            let job_rx = job_rx.clone();
            let artifact_tx = artifact_tx.clone();
            let contribution_tx = Arc::clone(&contribution_tx);
            let counters = Arc::clone(&counters);
            let cancel = Arc::clone(&cancel);

            thread::spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }

                    match run_job(job, &options) {
                        Ok(output) => {
                            let bytes: u64 = output
                                .artifacts
                                .iter()
                                .map(|a| match &a.body {
                                    zimfiction_zim::ArtifactBody::Content(bytes) => bytes.len() as u64,
                                    zimfiction_zim::ArtifactBody::Redirect(_) => 0,
                                })
                                .sum();
                            let count = output.artifacts.len() as u64;

                            for artifact in output.artifacts {
                                if artifact_tx.send(artifact).is_err() {
                                    break;
                                }
                            }
                            if let Some(contribution) = output.contribution {
                                let _ = contribution_tx.lock().unwrap().send(contribution);
                            }

                            let mut counters = counters.lock().unwrap();
                            counters.artifacts_written += count;
                            counters.bytes_written += bytes;
                        }
                        Err(RenderError::InputCorruption(_)) => {
                            counters.lock().unwrap().stories_skipped += 1;
                        }
                        Err(RenderError::Template(_)) => {
                            counters.lock().unwrap().artifacts_failed += 1;
                        }
                    }
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use zimfiction_types::{Author, Chapter, Status};

    fn sample_story(chapters: Vec<Chapter>) -> Story {
        Story {
            id: 1,
            publisher: "Demo".into(),
            author_ref: Author { name: "Alice".into(), publisher: "Demo".into(), url: String::new() },
            title: "Hello World".into(),
            summary_html: "<p>A <b>summary</b></p>".into(),
            language: "en".into(),
            status: Status::Completed,
            rating: Some("teen".into()),
            url: String::new(),
            published_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            updated_date: NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
            packaged_date: NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(),
            source_group: String::new(),
            source_name: String::new(),
            score: 0,
            chapters,
            tags: BTreeSet::new(),
        }
    }

    fn chapter(index: u32, text: &str) -> Chapter {
        Chapter { index, title: format!("Chapter {index}"), text_html: text.to_string() }
    }

    #[test]
    fn story_with_no_chapters_is_input_corruption() {
        let story = sample_story(vec![]);
        let err = render_story_page(&story, &RenderOptions::default()).unwrap_err();
        assert!(matches!(err, RenderError::InputCorruption(_)));
    }

    #[test]
    fn story_with_gapped_chapters_is_input_corruption() {
        let story = sample_story(vec![chapter(1, "a"), chapter(3, "b")]);
        let err = render_story_page(&story, &RenderOptions::default()).unwrap_err();
        assert!(matches!(err, RenderError::InputCorruption(_)));
    }

    #[test]
    fn story_page_produces_n_plus_3_artifacts() {
        let story = sample_story(vec![chapter(1, "<p>hi</p>"), chapter(2, "<p>there</p>")]);
        let output = render_story_page(&story, &RenderOptions::default()).expect("render");
        assert_eq!(output.artifacts.len(), 2 + 3);

        let paths: Vec<&str> = output.artifacts.iter().map(|a| a.path.as_str()).collect();
        assert!(paths.contains(&"/story/Demo/1/1"));
        assert!(paths.contains(&"/story/Demo/1/2"));
        assert!(paths.contains(&"/story/Demo/1/index"));
        assert!(paths.contains(&"/story/Demo/1/preview.json"));
        assert!(paths.contains(&"/story/Demo/1/"));
    }

    #[test]
    fn chapter_one_carries_the_extended_card_other_chapters_do_not() {
        let story = sample_story(vec![chapter(1, "<p>one</p>"), chapter(2, "<p>two</p>")]);
        let output = render_story_page(&story, &RenderOptions::default()).expect("render");

        let zimfiction_zim::ArtifactBody::Content(first) =
            &output.artifacts.iter().find(|a| a.path == "/story/Demo/1/1").unwrap().body
        else {
            panic!("expected content")
        };
        let first = String::from_utf8(first.clone()).unwrap();
        assert!(first.contains("story-card-extended"));
        assert!(first.contains(story.title.as_str()));

        let zimfiction_zim::ArtifactBody::Content(second) =
            &output.artifacts.iter().find(|a| a.path == "/story/Demo/1/2").unwrap().body
        else {
            panic!("expected content")
        };
        let second = String::from_utf8(second.clone()).unwrap();
        assert!(!second.contains("story-card-extended"));
    }

    #[test]
    fn extended_card_carries_visible_tags_not_first_class_ones() {
        use zimfiction_types::{Tag, TagType};
        let mut story = sample_story(vec![chapter(1, "<p>one</p>")]);
        story.tags = BTreeSet::from([
            Tag::new(TagType::Genre, "Fluff", false),
            Tag::new(TagType::Status, "completed", false),
        ]);
        let output = render_story_page(&story, &RenderOptions::default()).expect("render");
        let zimfiction_zim::ArtifactBody::Content(first) =
            &output.artifacts.iter().find(|a| a.path == "/story/Demo/1/1").unwrap().body
        else {
            panic!("expected content")
        };
        let first = String::from_utf8(first.clone()).unwrap();
        assert!(first.contains("Fluff"));
        assert!(!first.contains(">completed<"));
    }

    #[test]
    fn all_story_page_paths_are_distinct() {
        let story = sample_story(vec![chapter(1, "a"), chapter(2, "b"), chapter(3, "c")]);
        let output = render_story_page(&story, &RenderOptions::default()).expect("render");
        let mut paths: Vec<&str> = output.artifacts.iter().map(|a| a.path.as_str()).collect();
        let before = paths.len();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), before);
    }

    #[test]
    fn preview_json_round_trips_through_serde() {
        let story = sample_story(vec![chapter(1, "<p>hi there</p>")]);
        let output = render_story_page(&story, &RenderOptions::default()).expect("render");
        let preview_artifact = output
            .artifacts
            .iter()
            .find(|a| a.path == "/story/Demo/1/preview.json")
            .expect("preview artifact");

        let zimfiction_zim::ArtifactBody::Content(bytes) = &preview_artifact.body else {
            panic!("preview.json must be a content artifact");
        };
        let parsed: PreviewRecord = serde_json::from_slice(bytes).expect("parse preview.json");
        assert_eq!(parsed.summary_html, story.summary_html);
        assert_eq!(parsed.title, story.title);
    }

    #[test]
    fn story_page_emits_a_contribution() {
        let story = sample_story(vec![chapter(1, "a")]);
        let output = render_story_page(&story, &RenderOptions::default()).expect("render");
        assert!(matches!(output.contribution, Some(Contribution::Story(_))));
    }

    #[test]
    fn worker_pool_drains_jobs_and_shuts_down_when_the_channel_closes() {
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let queue = ArtifactQueue::new(2);
        let (contribution_tx, contribution_rx) = std::sync::mpsc::channel();
        let counters = Arc::new(Mutex::new(BuildCounters::new()));
        let cancel = Arc::new(AtomicBool::new(false));

        let story = Arc::new(sample_story(vec![chapter(1, "a")]));
        job_tx.send(Job::StoryPage { story }).unwrap();
        drop(job_tx);

        let handles = spawn_render_workers(2, job_rx, queue.sender(), contribution_tx, Arc::clone(&counters), cancel, RenderOptions::default());
        for handle in handles {
            handle.join().unwrap();
        }

        let mut received = 0;
        while queue.receiver().try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 4);
        assert!(contribution_rx.try_recv().is_ok());
        assert_eq!(counters.lock().unwrap().artifacts_written, 4);
    }

    #[test]
    fn input_corruption_increments_stories_skipped_not_artifacts_failed() {
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let queue = ArtifactQueue::new(1);
        let (contribution_tx, _contribution_rx) = std::sync::mpsc::channel();
        let counters = Arc::new(Mutex::new(BuildCounters::new()));
        let cancel = Arc::new(AtomicBool::new(false));

        let story = Arc::new(sample_story(vec![]));
        job_tx.send(Job::StoryPage { story }).unwrap();
        drop(job_tx);

        let handles = spawn_render_workers(1, job_rx, queue.sender(), contribution_tx, Arc::clone(&counters), cancel, RenderOptions::default());
        for handle in handles {
            handle.join().unwrap();
        }

        let counters = counters.lock().unwrap();
        assert_eq!(counters.stories_skipped, 1);
        assert_eq!(counters.artifacts_failed, 0);
    }
}
