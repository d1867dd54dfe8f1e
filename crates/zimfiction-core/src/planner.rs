//! `JobPlanner` (spec.md §4.1): enumerates the complete set of output
//! artifacts as a stream of [`Job`] values, partitioned into the six
//! phases. The per-story phase streams lazily, page by page, off the
//! store so a full dump never materializes as one in-memory `Vec<Story>`
//! (§4.1: "must not materialize the whole job list"); the remaining
//! phases enumerate distinct *entities* (authors, tags, series,
//! categories, publishers), whose cardinality is orders of magnitude
//! smaller than the story count, so those are built eagerly from an
//! [`AggregatorSnapshot`].

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use zimfiction_render::Job;
use zimfiction_store::{EntityStore, StoryScope};
use zimfiction_types::{Story, normalize};

use crate::errors::{BuildError, PlanError};

/// How many stories the per-story phase buffers from the store at once.
/// Bounds the planner's own memory use independent of the render
/// pipeline's backpressure (§4.1, §4.3's "bounded memory" goal).
pub const PLANNER_PAGE_SIZE: u64 = 200;

/// Lazily streams every story across `publishers`, one store page at a
/// time, honoring an optional `--debug-skip-stories` cap (§3). Never
/// holds more than one page of stories in memory.
struct StoryStream {
    store: Arc<dyn EntityStore>,
    publishers: VecDeque<String>,
    offset: u64,
    buffer: VecDeque<Story>,
    remaining_cap: Option<usize>,
}

impl StoryStream {
    fn new(store: Arc<dyn EntityStore>, publishers: Vec<String>, cap: Option<usize>) -> Self {
        Self {
            store,
            publishers: publishers.into(),
            offset: 0,
            buffer: VecDeque::new(),
            remaining_cap: cap,
        }
    }
}

impl Iterator for StoryStream {
    type Item = anyhow::Result<Story>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(cap) = self.remaining_cap {
            if cap == 0 {
                return None;
            }
        }
        loop {
            if let Some(story) = self.buffer.pop_front() {
                if let Some(cap) = &mut self.remaining_cap {
                    *cap -= 1;
                }
                return Some(Ok(story));
            }
            let publisher = self.publishers.front()?.clone();
            let scope = StoryScope::Publisher(publisher);
            match self.store.stories(&scope, self.offset, PLANNER_PAGE_SIZE) {
                Ok(page) if page.is_empty() => {
                    self.publishers.pop_front();
                    self.offset = 0;
                }
                Ok(page) => {
                    self.offset += page.len() as u64;
                    self.buffer.extend(page);
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Enumerates the full build's work set, phase by phase (§4.1).
pub struct JobPlanner {
    store: Arc<dyn EntityStore>,
}

impl JobPlanner {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Phase 1: one [`Job::StoryPage`] per story, across every publisher,
    /// capped by `--debug-skip-stories` if set.
    pub fn story_jobs(
        &self,
        debug_skip_stories: Option<usize>,
    ) -> impl Iterator<Item = Result<Job, BuildError>> + 'static {
        let store = Arc::clone(&self.store);
        let publishers_store = Arc::clone(&self.store);
        let publishers = publishers_store
            .publishers()
            .map(|v| v.into_iter().map(|p| p.name).collect::<Vec<_>>())
            .unwrap_or_default();

        StoryStream::new(store, publishers, debug_skip_stories).map(|result| {
            result
                .map(|story| Job::StoryPage { story: Arc::new(story) })
                .map_err(BuildError::from)
        })
    }
}

/// Groups `names` by their [`normalize`]d slug and fails with
/// [`PlanError::SlugCollision`] the first time two *distinct* names land
/// on the same slug (§8 scenario 2). `scope` is a human-readable label
/// used only in the error message (e.g. `"tag:genre"`, `"author:Demo"`).
pub fn check_slug_collisions<'a>(
    names: impl Iterator<Item = &'a str>,
    scope: &str,
) -> Result<(), PlanError> {
    let mut by_slug: BTreeMap<String, &'a str> = BTreeMap::new();
    for name in names {
        let slug = normalize(name);
        match by_slug.get(slug.as_str()) {
            Some(&existing) if existing != name => {
                return Err(PlanError::SlugCollision {
                    scope: scope.to_string(),
                    a: existing.to_string(),
                    b: name.to_string(),
                    slug,
                });
            }
            _ => {
                by_slug.insert(slug, name);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use zimfiction_store::InMemoryStore;
    use zimfiction_types::{Author, Chapter, Status};

    fn story(publisher: &str, id: u64) -> Story {
        Story {
            id,
            publisher: publisher.to_string(),
            author_ref: Author { name: "Alice".into(), publisher: publisher.to_string(), url: String::new() },
            title: format!("Story {id}"),
            summary_html: String::new(),
            language: "en".into(),
            status: Status::Completed,
            rating: None,
            url: String::new(),
            published_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            updated_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            packaged_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            source_group: String::new(),
            source_name: String::new(),
            score: 0,
            chapters: vec![Chapter { index: 1, title: "C1".into(), text_html: "hi".into() }],
            tags: BTreeSet::new(),
        }
    }

    #[test]
    fn slug_collision_is_detected() {
        let err = check_slug_collisions(vec!["a b", "a+b"].into_iter(), "tag:genre").unwrap_err();
        assert!(matches!(err, PlanError::SlugCollision { .. }));
    }

    #[test]
    fn identical_names_are_not_a_collision() {
        assert!(check_slug_collisions(vec!["Alice", "Alice"].into_iter(), "author").is_ok());
    }

    #[test]
    fn distinct_non_colliding_names_pass() {
        assert!(check_slug_collisions(vec!["Alice", "Bob"].into_iter(), "author").is_ok());
    }

    #[test]
    fn story_stream_yields_every_story_across_publishers() {
        let store = Arc::new(InMemoryStore::new(
            vec![story("Demo", 1), story("Demo", 2), story("Other", 1)],
            vec![],
        ));
        let planner = JobPlanner::new(store);
        let jobs: Vec<_> = planner.story_jobs(None).collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(jobs.len(), 3);
    }

    #[test]
    fn debug_skip_stories_caps_the_stream() {
        let store = Arc::new(InMemoryStore::new(
            vec![story("Demo", 1), story("Demo", 2), story("Demo", 3)],
            vec![],
        ));
        let planner = JobPlanner::new(store);
        let jobs: Vec<_> = planner.story_jobs(Some(2)).collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(jobs.len(), 2);
    }

    #[test]
    fn story_stream_pages_past_a_single_page_size() {
        let stories: Vec<Story> = (0..(PLANNER_PAGE_SIZE * 2 + 5))
            .map(|i| story("Demo", i))
            .collect();
        let store = Arc::new(InMemoryStore::new(stories, vec![]));
        let planner = JobPlanner::new(store);
        let jobs: Vec<_> = planner.story_jobs(None).collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(jobs.len(), (PLANNER_PAGE_SIZE * 2 + 5) as usize);
    }
}
