//! # Search index
//!
//! The `SearchIndexEmitter` (spec.md §4.4): per-scope `search_header.json`
//! plus `SHARD_SIZE`-bounded `search_content_<i>.json` shards, consumed
//! by the in-ZIM `ClientSearchEngine` (§4.5).
//!
//! A scope's `tags` / `implied_tags` id arrays must cover every field the
//! client can filter on — `{publisher, language, status, categories,
//! warnings, characters, relationships, tags, rating}` (§4.4) — not just
//! free-form content tags. [`Story`]'s `tags` set only carries the
//! content-tag graph edges (§3); this crate projects the four first-class
//! scalar fields (`publisher`, `language`, `status`, `rating`) into the
//! same scope-local id scheme as ordinary tags so the client's filter
//! kernel can treat every field uniformly.

use std::collections::BTreeMap;

use serde::Serialize;
use zimfiction_templates::striptags;
use zimfiction_types::{Story, TagType};

/// Records per shard file (spec.md §8 scenario 3, §4.4).
pub const SHARD_SIZE: u64 = 20;

/// Thresholds gating whether a scope gets a search index at all (§4.4).
/// Scope sizes outside `[n_min, n_max]` emit no index and the UI hides
/// the Search Options button. Exact values are left to the build
/// operator; these defaults avoid indexing trivially small scopes (where
/// a search box adds nothing) and scopes too vast to shard cheaply.
#[derive(Debug, Clone, Copy)]
pub struct SearchIndexOptions {
    pub n_min: u64,
    pub n_max: u64,
}

impl Default for SearchIndexOptions {
    fn default() -> Self {
        Self {
            n_min: 10,
            n_max: 200_000,
        }
    }
}

/// The ordered membership a story holds in one series: `(series_name,
/// index_within_series)`.
pub type SeriesMembership = (String, u32);

/// One `search_header.json` (§4.4).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHeader {
    pub num_pages: u64,
    pub tag_ids: BTreeMap<String, BTreeMap<String, u32>>,
    pub amounts: BTreeMap<u32, u64>,
}

/// One record inside a `search_content_<i>.json` shard (§4.4).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ShardRecord {
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
    pub categories: Vec<String>,
    pub series: Vec<SeriesMembership>,
    pub summary: String,
    pub tags: Vec<u32>,
    pub implied_tags: Vec<u32>,
    pub category_count: usize,
}

/// `(field_name, tag_name)` — the scope-local key every tag id is
/// assigned from, spanning both true tags and the four scalar fields
/// projected into the same scheme.
type FieldKey = (&'static str, String);

fn field_keys_for_story(story: &Story) -> (Vec<FieldKey>, Vec<FieldKey>) {
    let mut explicit = vec![
        ("publisher", story.publisher.clone()),
        ("language", story.language.clone()),
        ("status", story.status.as_str().to_string()),
        ("rating", story.display_rating()),
    ];
    let mut implied = Vec::new();

    for tag in &story.tags {
        let key = (tag.tag_type.search_field_name(), tag.name.clone());
        if tag.is_implied_on_story {
            implied.push(key);
        } else {
            explicit.push(key);
        }
    }

    (explicit, implied)
}

/// Assigns stable, scope-local integer ids to every distinct field key
/// seen across `stories`, in sorted order (deterministic across runs).
fn assign_tag_ids(stories: &[Story]) -> BTreeMap<FieldKey, u32> {
    let mut keys: Vec<FieldKey> = Vec::new();
    for story in stories {
        let (explicit, implied) = field_keys_for_story(story);
        keys.extend(explicit);
        keys.extend(implied);
    }
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .enumerate()
        .map(|(i, key)| (key, i as u32))
        .collect()
}

fn truncate_summary(html: &str, max_chars: usize) -> String {
    let text = striptags(html);
    if text.chars().count() <= max_chars {
        return text;
    }
    text.chars().take(max_chars).collect::<String>() + "…"
}

/// Builds the full search index for one scope, or `None` when the scope
/// falls outside `[n_min, n_max]` (§4.4).
///
/// `series_of` supplies each story's ordered series memberships — an
/// external projection since `Series` is a separate entity from `Story`
/// (§3) and this crate has no store dependency.
pub fn build_search_index(
    stories: &[Story],
    series_of: impl Fn(&Story) -> Vec<SeriesMembership>,
    options: &SearchIndexOptions,
) -> Option<(SearchHeader, Vec<Vec<ShardRecord>>)> {
    let n = stories.len() as u64;
    if n < options.n_min || n > options.n_max {
        return None;
    }

    let ids = assign_tag_ids(stories);

    let mut tag_ids: BTreeMap<String, BTreeMap<String, u32>> = BTreeMap::new();
    for ((field, name), id) in &ids {
        tag_ids
            .entry((*field).to_string())
            .or_default()
            .insert(name.clone(), *id);
    }

    let mut amounts: BTreeMap<u32, u64> = BTreeMap::new();
    let mut records: Vec<ShardRecord> = Vec::with_capacity(stories.len());

    for story in stories {
        let (explicit, implied) = field_keys_for_story(story);

        let mut explicit_ids: Vec<u32> = explicit.iter().map(|k| ids[k]).collect();
        explicit_ids.sort_unstable();
        explicit_ids.dedup();

        let mut implied_ids: Vec<u32> = implied.iter().map(|k| ids[k]).collect();
        implied_ids.sort_unstable();
        implied_ids.dedup();

        for &id in &explicit_ids {
            *amounts.entry(id).or_insert(0) += 1;
        }

        let categories: Vec<String> = story
            .tags
            .iter()
            .filter(|t| t.tag_type == TagType::Category && !t.is_implied_on_story)
            .map(|t| t.name.clone())
            .collect();

        records.push(ShardRecord {
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
            category_count: categories.len(),
            categories,
            series: series_of(story),
            summary: truncate_summary(&story.summary_html, 300),
            tags: explicit_ids,
            implied_tags: implied_ids,
        });
    }

    let num_pages = zimfiction_templates::ceil_div(n, SHARD_SIZE);
    let shards: Vec<Vec<ShardRecord>> = records
        .chunks(SHARD_SIZE as usize)
        .map(|chunk| chunk.to_vec())
        .collect();

    let header = SearchHeader {
        num_pages,
        tag_ids,
        amounts,
    };

    Some((header, shards))
}

/// Checks property 3 of spec.md §8: summing `amounts[t]` over every id in
/// `tag_ids["tags"]` equals the number of (story, tag) incidences for
/// that field across the scope. Exposed for use by integration tests
/// that build a header/shard pair and want to assert the invariant
/// holds end to end.
pub fn amounts_consistent_with_shards(header: &SearchHeader, shards: &[Vec<ShardRecord>]) -> bool {
    let mut recomputed: BTreeMap<u32, u64> = BTreeMap::new();
    for shard in shards {
        for record in shard {
            for &id in &record.tags {
                *recomputed.entry(id).or_insert(0) += 1;
            }
        }
    }
    recomputed == header.amounts
}
