//! # Aggregator
//!
//! The commutative-reduction cross-reference accumulator (spec.md §4.3):
//! per-entity-class counts, month histograms, tag frequency maps,
//! alt-identity clusters, and per-publisher category membership rollups.
//!
//! Per §5 ("Aggregator: writable only within its owning phase by a
//! single reducer thread that drains a per-worker contribution
//! channel — renderers do not touch the aggregator directly"), render
//! workers never see an [`Aggregator`] directly: they send [`Contribution`]
//! values down an `mpsc` channel and a single [`Reducer`] folds them in.
//! At the end of a phase the reducer hands back a sealed
//! [`AggregatorSnapshot`] that later phases read from only.
//!
//! Per §4.3's memory policy ("compact encodings ... never
//! graph-of-objects"), every scope key is an interned integer id rather
//! than a cloned `String`; [`StringInterner`] is the single source of
//! truth for the id ↔ string mapping.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::{Receiver, Sender, channel};

use chrono::NaiveDate;
use serde::Serialize;
use zimfiction_types::{Story, TagType};

/// Append-only string table; ids are stable for the table's lifetime.
#[derive(Debug, Default)]
pub struct StringInterner {
    strings: Vec<String>,
    index: std::collections::HashMap<String, u32>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.index.get(s) {
            return id;
        }
        let id = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), id);
        id
    }

    pub fn resolve(&self, id: u32) -> &str {
        &self.strings[id as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Month-bucketed published/updated counts, the source data for a
/// `storyupdates.json` chart (§6.5).
#[derive(Debug, Clone, Default)]
pub struct MonthHistogram {
    published: BTreeMap<String, u64>,
    updated: BTreeMap<String, u64>,
}

impl MonthHistogram {
    fn record(&mut self, published: NaiveDate, updated: NaiveDate) {
        *self
            .published
            .entry(published.format("%Y-%m").to_string())
            .or_insert(0) += 1;
        *self
            .updated
            .entry(updated.format("%Y-%m").to_string())
            .or_insert(0) += 1;
    }

    fn merge(&mut self, other: &MonthHistogram) {
        for (k, v) in &other.published {
            *self.published.entry(k.clone()).or_insert(0) += v;
        }
        for (k, v) in &other.updated {
            *self.updated.entry(k.clone()).or_insert(0) += v;
        }
    }

    /// Renders the `{ months, published, updated }` shape of §6.5, with
    /// every month that appears in either series present in `months` —
    /// both integer arrays the same length, zero-filled where absent.
    pub fn to_chart_data(&self) -> ChartData {
        let mut months: BTreeSet<&String> =
            self.published.keys().chain(self.updated.keys()).collect();
        let months: Vec<String> = {
            let mut v: Vec<String> = months.drain().cloned().collect();
            v.sort();
            v
        };
        let published = months
            .iter()
            .map(|m| *self.published.get(m).unwrap_or(&0) as i64)
            .collect();
        let updated = months
            .iter()
            .map(|m| *self.updated.get(m).unwrap_or(&0) as i64)
            .collect();
        ChartData {
            months,
            published,
            updated,
        }
    }
}

/// The `storyupdates.json` wire shape (§6.5).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChartData {
    pub months: Vec<String>,
    pub published: Vec<i64>,
    pub updated: Vec<i64>,
}

/// Counts + histogram accumulated for one scope (an author, a series, a
/// tag, a category, a publisher, or the whole dump).
#[derive(Debug, Clone, Default)]
pub struct ScopeStats {
    pub story_count: u64,
    pub word_count: u64,
    pub chapter_count: u64,
    histogram: MonthHistogram,
}

impl ScopeStats {
    fn record(&mut self, story: &Story) {
        self.story_count += 1;
        self.word_count += story.total_words();
        self.chapter_count += story.chapter_count() as u64;
        self.histogram.record(story.published_date, story.updated_date);
    }

    fn merge(&mut self, other: &ScopeStats) {
        self.story_count += other.story_count;
        self.word_count += other.word_count;
        self.chapter_count += other.chapter_count;
        self.histogram.merge(&other.histogram);
    }

    pub fn chart_data(&self) -> ChartData {
        self.histogram.to_chart_data()
    }
}

/// One render worker's observation about a story it rendered, sent down
/// the contribution channel rather than touching the aggregator directly.
#[derive(Debug, Clone)]
pub enum Contribution {
    Story(Box<Story>),
}

/// The single-owner accumulator. Only [`Reducer`] mutates one of these;
/// everything else reads a sealed [`AggregatorSnapshot`].
#[derive(Debug, Default)]
pub struct Aggregator {
    interner: StringInterner,
    global: ScopeStats,
    authors: BTreeMap<(u32, u32), ScopeStats>,
    publishers: BTreeMap<u32, ScopeStats>,
    tags: BTreeMap<(TagType, u32), ScopeStats>,
    categories: BTreeMap<(u32, u32), ScopeStats>,
    category_membership: BTreeMap<u32, BTreeMap<u32, u64>>,
    alt_identities: BTreeMap<u32, BTreeSet<u32>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one story's facts into every scope it belongs to. This is
    /// the only mutation path; it is a commutative reduction, so workers
    /// may deliver stories in any order (§4.3).
    pub fn record_story(&mut self, story: &Story) {
        let mut scratch = ScopeStats::default();
        scratch.record(story);

        self.global.merge(&scratch);

        let publisher_id = self.interner.intern(&story.publisher);
        self.publishers
            .entry(publisher_id)
            .or_default()
            .merge(&scratch);

        let author_name_id = self.interner.intern(&story.author_ref.name);
        self.authors
            .entry((publisher_id, author_name_id))
            .or_default()
            .merge(&scratch);
        self.alt_identities
            .entry(author_name_id)
            .or_default()
            .insert(publisher_id);

        for tag in &story.tags {
            let name_id = self.interner.intern(&tag.name);
            if tag.tag_type == TagType::Category {
                self.categories
                    .entry((publisher_id, name_id))
                    .or_default()
                    .merge(&scratch);
                *self
                    .category_membership
                    .entry(publisher_id)
                    .or_default()
                    .entry(name_id)
                    .or_insert(0) += 1;
            } else {
                self.tags
                    .entry((tag.tag_type, name_id))
                    .or_default()
                    .merge(&scratch);
            }
        }
    }

    /// Seals this phase's accumulation into a read-only snapshot.
    pub fn seal(self) -> AggregatorSnapshot {
        AggregatorSnapshot { inner: self }
    }
}

/// A phase-sealed, read-only view of an [`Aggregator`] (§4.3: "The
/// aggregator exposes a sealed snapshot at the end of each phase; later
/// phases read only from snapshots").
#[derive(Debug)]
pub struct AggregatorSnapshot {
    inner: Aggregator,
}

impl AggregatorSnapshot {
    pub fn global(&self) -> &ScopeStats {
        &self.inner.global
    }

    pub fn author(&self, publisher: &str, name: &str) -> Option<&ScopeStats> {
        let p = *self.inner.interner.index.get(publisher)?;
        let n = *self.inner.interner.index.get(name)?;
        self.inner.authors.get(&(p, n))
    }

    pub fn publisher(&self, publisher: &str) -> Option<&ScopeStats> {
        let p = *self.inner.interner.index.get(publisher)?;
        self.inner.publishers.get(&p)
    }

    pub fn tag(&self, tag_type: TagType, name: &str) -> Option<&ScopeStats> {
        let n = *self.inner.interner.index.get(name)?;
        self.inner.tags.get(&(tag_type, n))
    }

    pub fn category(&self, publisher: &str, name: &str) -> Option<&ScopeStats> {
        let p = *self.inner.interner.index.get(publisher)?;
        let n = *self.inner.interner.index.get(name)?;
        self.inner.categories.get(&(p, n))
    }

    /// Every category name (with its story count) attached to `publisher`
    /// — the "category membership rollups per publisher" of §4.3, used to
    /// render a publisher's `categories/<n>` listing pages.
    pub fn categories_for_publisher(&self, publisher: &str) -> Vec<(String, u64)> {
        let Some(&p) = self.inner.interner.index.get(publisher) else {
            return Vec::new();
        };
        let Some(members) = self.inner.category_membership.get(&p) else {
            return Vec::new();
        };
        members
            .iter()
            .map(|(&name_id, &count)| (self.inner.interner.resolve(name_id).to_string(), count))
            .collect()
    }

    /// Publishers under which an author name with this exact spelling
    /// also appears — the cross-publisher "alt identity" link cluster
    /// (§3, §4.3).
    pub fn alt_identity_publishers(&self, author_name: &str) -> Vec<String> {
        let Some(&n) = self.inner.interner.index.get(author_name) else {
            return Vec::new();
        };
        let Some(publisher_ids) = self.inner.alt_identities.get(&n) else {
            return Vec::new();
        };
        publisher_ids
            .iter()
            .map(|&id| self.inner.interner.resolve(id).to_string())
            .collect()
    }

    /// Every `(publisher, author_name)` pair observed during phase 1, for
    /// the per-author phase's planner to enumerate without a second store
    /// round trip.
    pub fn all_authors(&self) -> Vec<(String, String)> {
        self.inner
            .authors
            .keys()
            .map(|&(p, n)| (self.inner.interner.resolve(p).to_string(), self.inner.interner.resolve(n).to_string()))
            .collect()
    }

    /// Every publisher name observed during phase 1.
    pub fn all_publishers(&self) -> Vec<String> {
        self.inner
            .publishers
            .keys()
            .map(|&p| self.inner.interner.resolve(p).to_string())
            .collect()
    }

    /// Every `(tag_type, name)` pair observed during phase 1 (excludes
    /// categories, which are enumerated per-publisher via
    /// [`Self::categories_for_publisher`]).
    pub fn all_tags(&self) -> Vec<(TagType, String)> {
        self.inner
            .tags
            .keys()
            .map(|&(tag_type, n)| (tag_type, self.inner.interner.resolve(n).to_string()))
            .collect()
    }

    /// Every `(publisher, category_name)` pair observed during phase 1.
    pub fn all_categories(&self) -> Vec<(String, String)> {
        self.inner
            .categories
            .keys()
            .map(|&(p, n)| (self.inner.interner.resolve(p).to_string(), self.inner.interner.resolve(n).to_string()))
            .collect()
    }

    /// Coarse memory accounting for `--memprofile-directory` snapshots
    /// (§3): not a real allocator profile, just counts of
    /// how large each table has grown.
    pub fn memory_profile(&self) -> MemoryProfile {
        MemoryProfile {
            interned_strings: self.inner.interner.len(),
            author_scopes: self.inner.authors.len(),
            publisher_scopes: self.inner.publishers.len(),
            tag_scopes: self.inner.tags.len(),
            category_scopes: self.inner.categories.len(),
        }
    }
}

/// A structured, inspectable snapshot of the aggregator's table sizes —
/// written to `--memprofile-directory` at each phase boundary.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryProfile {
    pub interned_strings: usize,
    pub author_scopes: usize,
    pub publisher_scopes: usize,
    pub tag_scopes: usize,
    pub category_scopes: usize,
}

/// The reducer side of the contribution channel: the one thread allowed
/// to mutate the [`Aggregator`] (§5).
pub struct Reducer {
    aggregator: Aggregator,
    rx: Receiver<Contribution>,
}

impl Reducer {
    /// Creates a reducer plus the sender handle every render worker
    /// clones to report its contributions.
    pub fn new() -> (Self, Sender<Contribution>) {
        let (tx, rx) = channel();
        (
            Self {
                aggregator: Aggregator::new(),
                rx,
            },
            tx,
        )
    }

    /// Drains the channel until every sender has been dropped, then
    /// seals and returns the accumulated snapshot.
    pub fn run(mut self) -> AggregatorSnapshot {
        while let Ok(contribution) = self.rx.recv() {
            match contribution {
                Contribution::Story(story) => self.aggregator.record_story(&story),
            }
        }
        self.aggregator.seal()
    }
}
