//! # Types
//!
//! Core domain types for the zimfiction build stage: the read-only entity
//! model (`Story`, `Chapter`, `Author`, `Tag`, `Series`, `Publisher`,
//! `Category`) plus the two pure functions every other crate in this
//! workspace must agree on bit-for-bit: [`normalize`] (the URL slug
//! function) and [`word_count`].
//!
//! ## Serialization
//!
//! These types round-trip through `serde_json` for the `preview.json` and
//! `search_content_<i>.json` artifacts (see `zimfiction-search-index`).
//! Dates use `chrono::NaiveDate` serialized as `YYYY-MM-DD`.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A story's publication status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ongoing,
    Completed,
    Abandoned,
    Unknown,
}

impl Status {
    /// Lowercase wire/display form, matching the `snake_case` serde
    /// representation (used by the search index's `status` field, §4.4).
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ongoing => "ongoing",
            Status::Completed => "completed",
            Status::Abandoned => "abandoned",
            Status::Unknown => "unknown",
        }
    }
}

/// The eleven tag type buckets a `Tag` may belong to (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    Category,
    Warning,
    Relationship,
    Character,
    Genre,
    Rating,
    Language,
    Status,
    Publisher,
    Series,
    Special,
}

impl TagType {
    /// `true` for tag types already surfaced through one of a story's own
    /// first-class fields (status, rating, language), so they are never
    /// re-listed among `Story::ordered_visible_tags` (§3 invariant).
    pub fn is_first_class(self) -> bool {
        matches!(self, TagType::Status | TagType::Rating | TagType::Language)
    }

    /// Field name used in `search_header.json`'s `tag_ids` map (§4.4).
    pub fn search_field_name(self) -> &'static str {
        match self {
            TagType::Category => "categories",
            TagType::Warning => "warnings",
            TagType::Relationship => "relationships",
            TagType::Character => "characters",
            TagType::Genre => "tags",
            TagType::Rating => "rating",
            TagType::Language => "language",
            TagType::Status => "status",
            TagType::Publisher => "publisher",
            TagType::Series => "tags",
            TagType::Special => "tags",
        }
    }
}

/// A typed label attached to a story; may be explicit or implied (§3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub name: String,
    pub is_implied_on_story: bool,
}

impl Tag {
    pub fn new(tag_type: TagType, name: impl Into<String>, is_implied_on_story: bool) -> Self {
        Self {
            tag_type,
            name: name.into(),
            is_implied_on_story,
        }
    }

    /// Slug for this tag's URL path component.
    pub fn slug(&self) -> String {
        normalize(&self.name)
    }
}

/// A single chapter of a story (§3). `index` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub index: u32,
    pub title: String,
    pub text_html: String,
}

/// Identity of an author: unique by `(publisher, name)` (§3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub publisher: String,
    pub url: String,
}

impl Author {
    pub fn slug(&self) -> String {
        normalize(&self.name)
    }
}

/// One entry of a `Series`'s ordered membership list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMember {
    pub story_publisher: String,
    pub story_id: u64,
    pub index: u32,
}

/// A named, ordered sequence of stories, scoped to one publisher (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub publisher: String,
    pub members: Vec<SeriesMember>,
}

impl Series {
    pub fn slug(&self) -> String {
        normalize(&self.name)
    }
}

/// A publisher (originating archive site) (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publisher {
    pub name: String,
}

/// A complete story with its ordered chapters and tag set (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: u64,
    pub publisher: String,
    pub author_ref: Author,
    pub title: String,
    pub summary_html: String,
    pub language: String,
    pub status: Status,
    /// `None` means "missing"; the renderer shows `"Unknown"` rather than
    /// guessing, per spec.md §9's resolution of the `p is not none`
    /// open question.
    pub rating: Option<String>,
    pub url: String,
    pub published_date: NaiveDate,
    pub updated_date: NaiveDate,
    pub packaged_date: NaiveDate,
    pub source_group: String,
    pub source_name: String,
    pub score: i64,
    pub chapters: Vec<Chapter>,
    pub tags: BTreeSet<Tag>,
}

impl Story {
    /// Total word count, computed fresh from chapter text — never cached
    /// (§3 invariant).
    pub fn total_words(&self) -> u64 {
        self.chapters
            .iter()
            .map(|c| word_count(&c.text_html))
            .sum()
    }

    pub fn chapter_count(&self) -> u32 {
        self.chapters.len() as u32
    }

    /// Display rating: `"Unknown"` when absent, otherwise title-cased
    /// (spec.md §9 open question resolution).
    pub fn display_rating(&self) -> String {
        match &self.rating {
            None => "Unknown".to_string(),
            Some(r) => title_case(r),
        }
    }

    /// Stable ordering by tag type then tag name, excluding tags
    /// duplicated in first-class fields (status, rating, language) — the
    /// `ordered_visible_tags` invariant of §3.
    pub fn ordered_visible_tags(&self) -> Vec<&Tag> {
        self.tags
            .iter()
            .filter(|t| !t.tag_type.is_first_class())
            .collect()
    }

    /// Checks the `1..N` no-gaps chapter index invariant (§3).
    pub fn has_contiguous_chapters(&self) -> bool {
        let mut indices: Vec<u32> = self.chapters.iter().map(|c| c.index).collect();
        indices.sort_unstable();
        indices
            .iter()
            .enumerate()
            .all(|(i, &idx)| idx == (i as u32) + 1)
    }
}

/// Title-cases a word by uppercasing its first character; used only for
/// the rating display string (§9).
fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

/// Whitespace-split word count over normalized text, per §8 property 5.
/// Strips HTML tags first so markup doesn't inflate the count.
pub fn word_count(html: &str) -> u64 {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace().count() as u64
}

/// The URL slug function every server page and the client script must
/// agree on byte-for-byte (§6.3): spaces become `+`, `/` becomes `__`,
/// everything else passes through unchanged.
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            ' ' => out.push('+'),
            '/' => out.push_str("__"),
            other => out.push(other),
        }
    }
    out
}
