//! # Store
//!
//! The read-only entity store contract (spec.md §6.1). The relational
//! store itself — the import/implication stages, connection management,
//! and query execution — is an explicit external collaborator; this crate
//! only defines the trait the rest of the build stage programs against,
//! plus an [`InMemoryStore`] reference implementation used by tests and by
//! any embedder who already has the whole dump in memory.
//!
//! Connection strings passed to a concrete store are opaque to the core
//! (§6.1); this crate never inspects one.

use std::collections::BTreeMap;

use anyhow::Result;
use zimfiction_types::{Author, Publisher, Series, Story, TagType};

/// One of the ways the planner can ask the store to enumerate stories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryScope {
    Publisher(String),
    Author { publisher: String, name: String },
    Tag { tag_type: TagType, name: String },
    Category { publisher: String, name: String },
    Series { publisher: String, name: String },
}

/// A read-only view over the imported, implication-resolved dump.
///
/// Implementations must be safe to call concurrently from multiple render
/// workers (§5: "workers open their own handles").
pub trait EntityStore: Send + Sync {
    /// Total number of stories matching `scope`, for pagination planning.
    fn story_count(&self, scope: &StoryScope) -> Result<u64>;

    /// Stories matching `scope`, `limit` entries starting at `offset`,
    /// ordered by primary key (§6.1: "pagination by primary key").
    fn stories(&self, scope: &StoryScope, offset: u64, limit: u64) -> Result<Vec<Story>>;

    /// Fetch one story (with its chapters) by publisher + id.
    fn story(&self, publisher: &str, id: u64) -> Result<Option<Story>>;

    /// Every `(publisher, tag_type)` pair that has at least one tagged
    /// story, with its story count.
    fn tag_type_counts(&self) -> Result<Vec<((String, TagType), u64)>>;

    /// All known authors.
    fn authors(&self) -> Result<Vec<Author>>;

    /// Authors across publishers sharing `name` — the "alt identity"
    /// cross-publisher link cluster (§3).
    fn alt_identities(&self, name: &str) -> Result<Vec<Author>>;

    /// All known publishers.
    fn publishers(&self) -> Result<Vec<Publisher>>;

    /// Fetch a named series scoped to one publisher.
    fn series(&self, publisher: &str, name: &str) -> Result<Option<Series>>;

    /// Every known series, for the per-series phase's planner to
    /// enumerate (§4.1 phase 3). Unlike tags/categories/authors, series
    /// membership is not derivable from a story's own fields, so it must
    /// come from the store directly.
    fn all_series(&self) -> Result<Vec<Series>>;
}

/// A whole-dump-in-memory store, for tests and small embedders.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    stories: Vec<Story>,
    series: Vec<Series>,
}

impl InMemoryStore {
    pub fn new(stories: Vec<Story>, series: Vec<Series>) -> Self {
        Self { stories, series }
    }

    fn matches(story: &Story, scope: &StoryScope) -> bool {
        match scope {
            StoryScope::Publisher(p) => &story.publisher == p,
            StoryScope::Author { publisher, name } => {
                &story.publisher == publisher && &story.author_ref.name == name
            }
            StoryScope::Tag { tag_type, name } => story
                .tags
                .iter()
                .any(|t| t.tag_type == *tag_type && &t.name == name),
            StoryScope::Category { publisher, name } => {
                &story.publisher == publisher
                    && story
                        .tags
                        .iter()
                        .any(|t| t.tag_type == TagType::Category && &t.name == name)
            }
            StoryScope::Series { .. } => false,
        }
    }
}

impl EntityStore for InMemoryStore {
    fn story_count(&self, scope: &StoryScope) -> Result<u64> {
        if let StoryScope::Series { publisher, name } = scope {
            let series = self
                .series
                .iter()
                .find(|s| &s.publisher == publisher && &s.name == name);
            return Ok(series.map(|s| s.members.len() as u64).unwrap_or(0));
        }
        Ok(self.stories.iter().filter(|s| Self::matches(s, scope)).count() as u64)
    }

    fn stories(&self, scope: &StoryScope, offset: u64, limit: u64) -> Result<Vec<Story>> {
        if let StoryScope::Series { publisher, name } = scope {
            let Some(series) = self
                .series
                .iter()
                .find(|s| &s.publisher == publisher && &s.name == name)
            else {
                return Ok(Vec::new());
            };
            let mut out = Vec::new();
            for member in series.members.iter().skip(offset as usize).take(limit as usize) {
                if let Some(story) = self.story(&member.story_publisher, member.story_id)? {
                    out.push(story);
                }
            }
            return Ok(out);
        }
        Ok(self
            .stories
            .iter()
            .filter(|s| Self::matches(s, scope))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn story(&self, publisher: &str, id: u64) -> Result<Option<Story>> {
        Ok(self
            .stories
            .iter()
            .find(|s| s.publisher == publisher && s.id == id)
            .cloned())
    }

    fn tag_type_counts(&self) -> Result<Vec<((String, TagType), u64)>> {
        let mut counts: BTreeMap<(String, TagType), u64> = BTreeMap::new();
        for story in &self.stories {
            for tag in &story.tags {
                *counts.entry((story.publisher.clone(), tag.tag_type)).or_insert(0) += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    fn authors(&self) -> Result<Vec<Author>> {
        let mut authors: Vec<Author> = self.stories.iter().map(|s| s.author_ref.clone()).collect();
        authors.sort();
        authors.dedup();
        Ok(authors)
    }

    fn alt_identities(&self, name: &str) -> Result<Vec<Author>> {
        let mut matches: Vec<Author> = self
            .stories
            .iter()
            .map(|s| s.author_ref.clone())
            .filter(|a| a.name == name)
            .collect();
        matches.sort();
        matches.dedup();
        Ok(matches)
    }

    fn publishers(&self) -> Result<Vec<Publisher>> {
        let mut names: Vec<String> = self.stories.iter().map(|s| s.publisher.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names.into_iter().map(|name| Publisher { name }).collect())
    }

    fn series(&self, publisher: &str, name: &str) -> Result<Option<Series>> {
        Ok(self
            .series
            .iter()
            .find(|s| s.publisher == publisher && s.name == name)
            .cloned())
    }

    fn all_series(&self) -> Result<Vec<Series>> {
        Ok(self.series.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use zimfiction_types::{Chapter, Status};

    fn demo_story() -> Story {
        Story {
            id: 1,
            publisher: "Demo".into(),
            author_ref: Author {
                name: "Alice".into(),
                publisher: "Demo".into(),
                url: "https://example.test".into(),
            },
            title: "Hello World".into(),
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
            chapters: vec![Chapter { index: 1, title: "Hello world".into(), text_html: String::new() }],
            tags: BTreeSet::new(),
        }
    }

    #[test]
    fn in_memory_store_scopes_by_publisher() {
        let store = InMemoryStore::new(vec![demo_story()], vec![]);
        let scope = StoryScope::Publisher("Demo".into());
        assert_eq!(store.story_count(&scope).unwrap(), 1);
        assert_eq!(store.stories(&scope, 0, 10).unwrap().len(), 1);
    }

    #[test]
    fn in_memory_store_fetches_by_id() {
        let store = InMemoryStore::new(vec![demo_story()], vec![]);
        assert!(store.story("Demo", 1).unwrap().is_some());
        assert!(store.story("Demo", 2).unwrap().is_none());
    }

    #[test]
    fn all_series_returns_every_known_series() {
        let series = zimfiction_types::Series {
            name: "Saga".into(),
            publisher: "Demo".into(),
            members: vec![],
        };
        let store = InMemoryStore::new(vec![demo_story()], vec![series.clone()]);
        assert_eq!(store.all_series().unwrap(), vec![series]);
    }
}
