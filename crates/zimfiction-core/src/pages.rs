//! Entity adapters (spec.md §4.1 phases 2-6, §6.2 paths, §9 "Entity
//! adapters: projections of the entity store into render-ready views").
//! Each `*_jobs` function enumerates one phase's entities from a sealed
//! [`AggregatorSnapshot`] (or, for series, directly from the store) and
//! returns the phase's complete [`Job`] list — phases 2-6 enumerate over
//! entity counts (authors, tags, series, categories, publishers) that are
//! orders of magnitude smaller than the story count, so materializing the
//! whole list for one phase is safe (unlike phase 1, which streams).

use std::collections::BTreeMap;
use std::sync::Arc;

use zimfiction_aggregator::{Aggregator, AggregatorSnapshot, ScopeStats};
use zimfiction_render::{Job, JobOutput, RenderError};
use zimfiction_search_index::{SearchIndexOptions, SeriesMembership, build_search_index};
use zimfiction_store::{EntityStore, StoryScope};
use zimfiction_templates::{ceil_div, escape, format_date, format_number, pagination_window, visible_tags_html};
use zimfiction_types::{Series, Story, TagType, normalize};
use zimfiction_zim::{Artifact, ArtifactHint, Mime};

use crate::errors::BuildError;
use crate::planner::check_slug_collisions;

/// Stories per listing page (spec.md §4.2, §8 boundary property).
pub const STORIES_PER_PAGE: u64 = 20;

/// Maps every series membership the store knows about so search-index
/// emission (§4.4's `series` field) can thread it through without a
/// per-story store round trip. Built once per build, shared by every tag
/// and category job via `Arc`.
pub fn build_series_index(
    store: &dyn EntityStore,
) -> Result<BTreeMap<(String, u64), Vec<SeriesMembership>>, BuildError> {
    let mut index: BTreeMap<(String, u64), Vec<SeriesMembership>> = BTreeMap::new();
    for series in store.all_series().map_err(BuildError::from)? {
        for member in &series.members {
            index
                .entry((member.story_publisher.clone(), member.story_id))
                .or_default()
                .push((series.name.clone(), member.index));
        }
    }
    Ok(index)
}

fn tag_type_slug(tag_type: TagType) -> &'static str {
    match tag_type {
        TagType::Category => "category",
        TagType::Warning => "warning",
        TagType::Relationship => "relationship",
        TagType::Character => "character",
        TagType::Genre => "genre",
        TagType::Rating => "rating",
        TagType::Language => "language",
        TagType::Status => "status",
        TagType::Publisher => "publisher",
        TagType::Series => "series",
        TagType::Special => "special",
    }
}

/// Compact card (§4.2): one line per story in a listing page. Shows only
/// the visible tag list, not the summary.
fn story_card_html(story: &Story) -> String {
    let tags = visible_tags_html(story);
    let tags_html = if tags.is_empty() { String::new() } else { format!(" &mdash; {tags}") };
    format!(
        "<li class=\"story-card\"><a href=\"/story/{publisher}/{id}/\">{title}</a> by \
         <a href=\"/author/{publisher}/{author_slug}/1\">{author}</a> &mdash; {words} words, \
         {chapters} chapters, updated {updated}{tags_html}</li>",
        publisher = escape(&story.publisher),
        id = story.id,
        title = escape(&story.title),
        author_slug = normalize(&story.author_ref.name),
        author = escape(&story.author_ref.name),
        words = format_number(story.total_words()),
        chapters = story.chapter_count(),
        updated = format_date(story.updated_date),
    )
}

fn pagination_html(base_path: &str, cur: u32, num_pages: u32) -> String {
    let entries = pagination_window(cur, num_pages);
    if entries.is_empty() {
        return String::new();
    }
    let mut out = String::from("<nav class=\"pagination\">");
    for entry in entries {
        match entry {
            zimfiction_templates::PageEntry::Page(p) => {
                if p == cur {
                    out.push_str(&format!("<span class=\"current\">{p}</span>"));
                } else {
                    out.push_str(&format!("<a href=\"{base_path}/{p}\">{p}</a>"));
                }
            }
            zimfiction_templates::PageEntry::Ellipsis => out.push_str("<span class=\"ellipsis\">&hellip;</span>"),
        }
    }
    out.push_str("</nav>");
    out
}

fn listing_page_html(title: &str, stories_page: &[Story], cur: u32, num_pages: u32, base_path: &str) -> String {
    let mut out = format!(
        "<html><head><title>{title}</title></head><body><h1>{title}</h1><ul>",
        title = escape(title)
    );
    for story in stories_page {
        out.push_str(&story_card_html(story));
    }
    out.push_str("</ul>");
    out.push_str(&pagination_html(base_path, cur, num_pages));
    out.push_str("</body></html>");
    out
}

fn stats_page_html(title: &str, stats: &ScopeStats) -> String {
    format!(
        "<html><head><title>{title} &mdash; statistics</title></head><body><h1>{title}</h1>\
         <ul><li>{stories} stories</li><li>{words} words</li><li>{chapters} chapters</li></ul></body></html>",
        title = escape(title),
        stories = format_number(stats.story_count),
        words = format_number(stats.word_count),
        chapters = format_number(stats.chapter_count),
    )
}

fn chart_artifact(path: impl Into<String>, stats: &ScopeStats) -> Result<Artifact, RenderError> {
    let data = stats.chart_data();
    let bytes = serde_json::to_vec(&data)
        .map_err(|e| RenderError::Template(format!("failed to serialize chart data: {e}")))?;
    Ok(Artifact::content(path, Mime::ApplicationJson, bytes, ArtifactHint::UNIQUE))
}

fn paginated_story_artifacts(
    stories: &[Story],
    title: &str,
    base_path: &str,
) -> Vec<Artifact> {
    let num_pages = ceil_div(stories.len() as u64, STORIES_PER_PAGE).max(1) as u32;
    let empty: &[Story] = &[];
    let chunks: Vec<&[Story]> = if stories.is_empty() {
        vec![empty]
    } else {
        stories.chunks(STORIES_PER_PAGE as usize).collect()
    };

    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let page = (i + 1) as u32;
            let html = listing_page_html(title, chunk, page, num_pages, base_path);
            Artifact::content(format!("{base_path}/{page}"), Mime::TextHtml, html.into_bytes(), ArtifactHint::UNIQUE)
        })
        .collect()
}

fn search_index_artifacts(
    stories: &[Story],
    base_path: &str,
    series_index: &BTreeMap<(String, u64), Vec<SeriesMembership>>,
    search_options: &SearchIndexOptions,
) -> Result<Vec<Artifact>, RenderError> {
    let Some((header, shards)) = build_search_index(
        stories,
        |story| series_index.get(&(story.publisher.clone(), story.id)).cloned().unwrap_or_default(),
        search_options,
    ) else {
        return Ok(Vec::new());
    };

    let mut artifacts = Vec::with_capacity(1 + shards.len());
    let header_bytes = serde_json::to_vec(&header)
        .map_err(|e| RenderError::Template(format!("failed to serialize search header: {e}")))?;
    artifacts.push(Artifact::content(
        format!("{base_path}/search_header.json"),
        Mime::ApplicationJson,
        header_bytes,
        ArtifactHint::UNIQUE,
    ));
    for (i, shard) in shards.into_iter().enumerate() {
        let shard_bytes = serde_json::to_vec(&shard)
            .map_err(|e| RenderError::Template(format!("failed to serialize search shard {i}: {e}")))?;
        artifacts.push(Artifact::content(
            format!("{base_path}/search_content_{i}.json"),
            Mime::ApplicationJson,
            shard_bytes,
            ArtifactHint::UNIQUE,
        ));
    }
    Ok(artifacts)
}

// ---------------------------------------------------------------- authors

/// Phase 2 (§4.1): one job per `(publisher, author name)` pair observed
/// during phase 1.
pub fn author_jobs(
    store: &Arc<dyn EntityStore>,
    snapshot: &Arc<AggregatorSnapshot>,
) -> Result<Vec<Job>, BuildError> {
    let authors = snapshot.all_authors();

    let mut by_publisher: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (publisher, name) in &authors {
        by_publisher.entry(publisher.as_str()).or_default().push(name.as_str());
    }
    for (publisher, names) in &by_publisher {
        check_slug_collisions(names.iter().copied(), &format!("author:{publisher}")).map_err(BuildError::Plan)?;
    }

    let mut jobs = Vec::with_capacity(authors.len());
    for (publisher, name) in authors {
        let store = Arc::clone(store);
        let snapshot = Arc::clone(snapshot);
        jobs.push(Job::Custom(Box::new(move |_options| {
            render_author_entity(&store, &snapshot, &publisher, &name)
        })));
    }
    Ok(jobs)
}

/// The cross-publisher alt-identity link cluster (§3, §4.3): other
/// publishers under which an author with this exact spelling also
/// appears, each linked to that publisher's copy of the author page.
fn alt_identities_html(name: &str, slug: &str, other_publishers: &[String]) -> String {
    let mut out = format!(
        "<html><head><title>{name} &mdash; also published under</title></head><body>\
         <h1>{name} also publishes as</h1><ul>",
        name = escape(name)
    );
    for publisher in other_publishers {
        out.push_str(&format!(
            "<li><a href=\"/author/{publisher}/{slug}/1\">{publisher}</a></li>",
            publisher = escape(publisher),
        ));
    }
    out.push_str("</ul></body></html>");
    out
}

fn render_author_entity(
    store: &Arc<dyn EntityStore>,
    snapshot: &Arc<AggregatorSnapshot>,
    publisher: &str,
    name: &str,
) -> Result<JobOutput, RenderError> {
    let scope = StoryScope::Author { publisher: publisher.to_string(), name: name.to_string() };
    let count = store.story_count(&scope).map_err(|e| RenderError::InputCorruption(e.to_string()))?;
    let stories = store.stories(&scope, 0, count).map_err(|e| RenderError::InputCorruption(e.to_string()))?;

    let slug = normalize(name);
    let base_path = format!("/author/{publisher}/{slug}");
    let title = format!("{name} ({publisher})");

    let mut artifacts = paginated_story_artifacts(&stories, &title, &base_path);

    if let Some(stats) = snapshot.author(publisher, name) {
        artifacts.push(chart_artifact(format!("{base_path}/storyupdates.json"), stats)?);
    }

    let mut other_publishers: Vec<String> = snapshot
        .alt_identity_publishers(name)
        .into_iter()
        .filter(|p| p != publisher)
        .collect();
    if !other_publishers.is_empty() {
        other_publishers.sort();
        artifacts.push(Artifact::content(
            format!("{base_path}/alt_identities.html"),
            Mime::TextHtml,
            alt_identities_html(name, &slug, &other_publishers).into_bytes(),
            ArtifactHint::UNIQUE,
        ));
    }

    Ok(JobOutput::artifacts_only(artifacts))
}

// ----------------------------------------------------------------- series

/// Phase 3 (§4.1): one job per known [`Series`], fetched directly from the
/// store since series membership is not derivable from a story's own
/// fields (unlike authors/tags/categories, which the aggregator already
/// enumerated in phase 1).
pub fn series_jobs(store: &Arc<dyn EntityStore>) -> Result<Vec<Job>, BuildError> {
    let all = store.all_series().map_err(BuildError::from)?;

    let mut by_publisher: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for series in &all {
        by_publisher.entry(series.publisher.as_str()).or_default().push(series.name.as_str());
    }
    for (publisher, names) in &by_publisher {
        check_slug_collisions(names.iter().copied(), &format!("series:{publisher}")).map_err(BuildError::Plan)?;
    }

    let mut jobs = Vec::with_capacity(all.len());
    for series in all {
        let store = Arc::clone(store);
        jobs.push(Job::Custom(Box::new(move |_options| render_series_entity(&store, &series))));
    }
    Ok(jobs)
}

fn render_series_entity(store: &Arc<dyn EntityStore>, series: &Series) -> Result<JobOutput, RenderError> {
    let mut stories = Vec::with_capacity(series.members.len());
    for member in &series.members {
        let story = store
            .story(&member.story_publisher, member.story_id)
            .map_err(|e| RenderError::InputCorruption(e.to_string()))?
            .ok_or_else(|| {
                RenderError::InputCorruption(format!(
                    "series {}/{} references missing story {}/{}",
                    series.publisher, series.name, member.story_publisher, member.story_id
                ))
            })?;
        stories.push(story);
    }

    // Ad-hoc chart: the Aggregator never tracks per-series stats (§4.3's
    // scope list is authors/publishers/tags/categories/global only), so a
    // throwaway Aggregator folds this series' own members instead.
    let mut agg = Aggregator::new();
    for story in &stories {
        agg.record_story(story);
    }
    let snapshot = agg.seal();

    let slug = normalize(&series.name);
    let base_path = format!("/series/{}/{}", series.publisher, slug);
    let title = format!("{} ({})", series.name, series.publisher);
    let html = listing_page_html(&title, &stories, 1, 1, &base_path);

    let mut artifacts = vec![Artifact::content(
        format!("{base_path}/"),
        Mime::TextHtml,
        html.into_bytes(),
        ArtifactHint::UNIQUE,
    )];
    artifacts.push(chart_artifact(format!("{base_path}/storyupdates.json"), snapshot.global())?);

    Ok(JobOutput::artifacts_only(artifacts))
}

// ------------------------------------------------------------- tags/categories

/// Phase 4 (§4.1): one job per non-category tag observed during phase 1.
pub fn tag_jobs(
    store: &Arc<dyn EntityStore>,
    snapshot: &Arc<AggregatorSnapshot>,
    series_index: &Arc<BTreeMap<(String, u64), Vec<SeriesMembership>>>,
    search_options: SearchIndexOptions,
) -> Result<Vec<Job>, BuildError> {
    let tags = snapshot.all_tags();

    let mut by_type: BTreeMap<TagType, Vec<&str>> = BTreeMap::new();
    for (tag_type, name) in &tags {
        by_type.entry(*tag_type).or_default().push(name.as_str());
    }
    for (tag_type, names) in &by_type {
        check_slug_collisions(names.iter().copied(), &format!("tag:{}", tag_type_slug(*tag_type)))
            .map_err(BuildError::Plan)?;
    }

    let mut jobs = Vec::with_capacity(tags.len());
    for (tag_type, name) in tags {
        let store = Arc::clone(store);
        let snapshot = Arc::clone(snapshot);
        let series_index = Arc::clone(series_index);
        jobs.push(Job::Custom(Box::new(move |_options| {
            render_tag_entity(&store, &snapshot, tag_type, &name, &series_index, search_options)
        })));
    }
    Ok(jobs)
}

fn render_tag_entity(
    store: &Arc<dyn EntityStore>,
    snapshot: &Arc<AggregatorSnapshot>,
    tag_type: TagType,
    name: &str,
    series_index: &BTreeMap<(String, u64), Vec<SeriesMembership>>,
    search_options: SearchIndexOptions,
) -> Result<JobOutput, RenderError> {
    let scope = StoryScope::Tag { tag_type, name: name.to_string() };
    let count = store.story_count(&scope).map_err(|e| RenderError::InputCorruption(e.to_string()))?;
    let stories = store.stories(&scope, 0, count).map_err(|e| RenderError::InputCorruption(e.to_string()))?;

    let slug = normalize(name);
    let base_path = format!("/tag/{}/{}", tag_type_slug(tag_type), slug);
    let title = format!("{name} ({})", tag_type_slug(tag_type));

    let mut artifacts = paginated_story_artifacts(&stories, &title, &base_path);

    if let Some(stats) = snapshot.tag(tag_type, name) {
        artifacts.push(chart_artifact(format!("{base_path}/storyupdates.json"), stats)?);
        artifacts.push(Artifact::content(
            format!("{base_path}/stats"),
            Mime::TextHtml,
            stats_page_html(&title, stats).into_bytes(),
            ArtifactHint::UNIQUE,
        ));
    }

    artifacts.extend(search_index_artifacts(&stories, &base_path, series_index, &search_options)?);

    Ok(JobOutput::artifacts_only(artifacts))
}

/// Phase 4 (§4.1): one job per `(publisher, category name)` pair observed
/// during phase 1.
pub fn category_jobs(
    store: &Arc<dyn EntityStore>,
    snapshot: &Arc<AggregatorSnapshot>,
    series_index: &Arc<BTreeMap<(String, u64), Vec<SeriesMembership>>>,
    search_options: SearchIndexOptions,
) -> Result<Vec<Job>, BuildError> {
    let publishers = snapshot.all_publishers();
    let mut jobs = Vec::new();

    for publisher in publishers {
        let categories = snapshot.categories_for_publisher(&publisher);
        let names: Vec<&str> = categories.iter().map(|(name, _)| name.as_str()).collect();
        check_slug_collisions(names.into_iter(), &format!("category:{publisher}")).map_err(BuildError::Plan)?;

        for (name, _count) in categories {
            let store = Arc::clone(store);
            let snapshot = Arc::clone(snapshot);
            let series_index = Arc::clone(series_index);
            let publisher = publisher.clone();
            jobs.push(Job::Custom(Box::new(move |_options| {
                render_category_entity(&store, &snapshot, &publisher, &name, &series_index, search_options)
            })));
        }
    }
    Ok(jobs)
}

fn render_category_entity(
    store: &Arc<dyn EntityStore>,
    snapshot: &Arc<AggregatorSnapshot>,
    publisher: &str,
    name: &str,
    series_index: &BTreeMap<(String, u64), Vec<SeriesMembership>>,
    search_options: SearchIndexOptions,
) -> Result<JobOutput, RenderError> {
    let scope = StoryScope::Category { publisher: publisher.to_string(), name: name.to_string() };
    let count = store.story_count(&scope).map_err(|e| RenderError::InputCorruption(e.to_string()))?;
    let stories = store.stories(&scope, 0, count).map_err(|e| RenderError::InputCorruption(e.to_string()))?;

    let slug = normalize(name);
    let base_path = format!("/category/{publisher}/{slug}");
    let title = format!("{name} ({publisher})");

    let mut artifacts = paginated_story_artifacts(&stories, &title, &base_path);

    if let Some(stats) = snapshot.category(publisher, name) {
        artifacts.push(chart_artifact(format!("{base_path}/storyupdates.json"), stats)?);
        artifacts.push(Artifact::content(
            format!("{base_path}/stats"),
            Mime::TextHtml,
            stats_page_html(&title, stats).into_bytes(),
            ArtifactHint::UNIQUE,
        ));
    }

    artifacts.extend(search_index_artifacts(&stories, &base_path, series_index, &search_options)?);

    Ok(JobOutput::artifacts_only(artifacts))
}

// -------------------------------------------------------------- publishers

/// Phase 5 (§4.1): one job per publisher observed during phase 1.
pub fn publisher_jobs(
    store: &Arc<dyn EntityStore>,
    snapshot: &Arc<AggregatorSnapshot>,
) -> Result<Vec<Job>, BuildError> {
    let publishers = snapshot.all_publishers();
    check_slug_collisions(publishers.iter().map(|s| s.as_str()), "publisher").map_err(BuildError::Plan)?;

    let mut jobs = Vec::with_capacity(publishers.len());
    for publisher in publishers {
        let store = Arc::clone(store);
        let snapshot = Arc::clone(snapshot);
        jobs.push(Job::Custom(Box::new(move |_options| render_publisher_entity(&store, &snapshot, &publisher))));
    }
    Ok(jobs)
}

fn render_publisher_entity(
    _store: &Arc<dyn EntityStore>,
    snapshot: &Arc<AggregatorSnapshot>,
    publisher: &str,
) -> Result<JobOutput, RenderError> {
    let base_path = format!("/publisher/{publisher}");
    let stats = snapshot.publisher(publisher);
    let mut categories = snapshot.categories_for_publisher(publisher);
    categories.sort();

    let landing_html = format!(
        "<html><head><title>{publisher}</title></head><body><h1>{publisher}</h1>\
         <p>{stories} stories across {categories} categories</p>\
         <p><a href=\"{base_path}/categories/1\">Browse categories</a></p></body></html>",
        publisher = escape(publisher),
        stories = stats.map(|s| format_number(s.story_count)).unwrap_or_else(|| "0".to_string()),
        categories = categories.len(),
    );

    let mut artifacts = vec![Artifact::content(
        format!("{base_path}/"),
        Mime::TextHtml,
        landing_html.into_bytes(),
        ArtifactHint::UNIQUE,
    )];

    if let Some(stats) = stats {
        artifacts.push(chart_artifact(format!("{base_path}/storyupdates.json"), stats)?);
    }

    let num_pages = ceil_div(categories.len() as u64, STORIES_PER_PAGE).max(1) as u32;
    let empty: &[(String, u64)] = &[];
    let chunks: Vec<&[(String, u64)]> = if categories.is_empty() {
        vec![empty]
    } else {
        categories.chunks(STORIES_PER_PAGE as usize).collect()
    };

    for (i, chunk) in chunks.iter().enumerate() {
        let page = (i + 1) as u32;
        let html = category_listing_page_html(publisher, chunk, page, num_pages, &base_path);
        artifacts.push(Artifact::content(
            format!("{base_path}/categories/{page}"),
            Mime::TextHtml,
            html.into_bytes(),
            ArtifactHint::UNIQUE,
        ));
    }

    Ok(JobOutput::artifacts_only(artifacts))
}

fn category_listing_page_html(
    publisher: &str,
    categories: &[(String, u64)],
    cur: u32,
    num_pages: u32,
    base_path: &str,
) -> String {
    let mut out = format!(
        "<html><head><title>{publisher} categories</title></head><body><h1>{publisher} categories</h1><ul>",
        publisher = escape(publisher)
    );
    for (name, count) in categories {
        let slug = normalize(name);
        out.push_str(&format!(
            "<li><a href=\"/category/{publisher}/{slug}/1\">{name}</a> ({count})</li>",
            publisher = escape(publisher),
            name = escape(name),
            count = format_number(*count),
        ));
    }
    out.push_str("</ul>");
    out.push_str(&pagination_html(&format!("{base_path}/categories"), cur, num_pages));
    out.push_str("</body></html>");
    out
}

// ------------------------------------------------------------------ global

fn asset_mime(mime: &str) -> Mime {
    match mime {
        "image/png" => Mime::ImagePng,
        "image/x-icon" => Mime::ImageXIcon,
        "text/css" => Mime::TextCss,
        "application/javascript" => Mime::ApplicationJavascript,
        "application/json" => Mime::ApplicationJson,
        _ => Mime::TextHtml,
    }
}

fn global_index_html(publishers: &[String], stats: &ScopeStats) -> String {
    let mut out = format!(
        "<html><head><title>ZimFiction</title></head><body><h1>ZimFiction</h1>\
         <p>{stories} stories across {count} publishers</p><ul>",
        stories = format_number(stats.story_count),
        count = publishers.len(),
    );
    for publisher in publishers {
        out.push_str(&format!(
            "<li><a href=\"/publisher/{publisher}/\">{publisher}</a></li>",
            publisher = escape(publisher)
        ));
    }
    out.push_str("</ul><p><a href=\"/statistics.html\">Statistics</a> &middot; \
         <a href=\"/info/index.html\">About</a></p></body></html>");
    out
}

fn info_index_html() -> String {
    "<html><head><title>About</title></head><body><h1>About this archive</h1>\
     <p>This ZIM file was generated by the zimfiction build stage.</p>\
     <p><a href=\"/info/acknowledgements.html\">Acknowledgements</a></p></body></html>"
        .to_string()
}

fn info_acknowledgements_html() -> String {
    "<html><head><title>Acknowledgements</title></head><body><h1>Acknowledgements</h1>\
     <p>Thanks to every archive and author whose work is preserved here.</p></body></html>"
        .to_string()
}

/// Phase 6 (§4.1): the root redirect, the publisher landing/statistics/info
/// pages, and the static assets, all independent of one another and
/// content-independent from prior phases except for reading the global
/// aggregator snapshot.
pub fn global_jobs(snapshot: &Arc<AggregatorSnapshot>) -> Vec<Job> {
    let snapshot = Arc::clone(snapshot);
    vec![Job::Custom(Box::new(move |_options| render_global_entity(&snapshot)))]
}

fn render_global_entity(snapshot: &Arc<AggregatorSnapshot>) -> Result<JobOutput, RenderError> {
    let mut publishers = snapshot.all_publishers();
    publishers.sort();

    let mut artifacts = vec![
        Artifact::redirect("/", "index.html"),
        Artifact::content(
            "/index.html",
            Mime::TextHtml,
            global_index_html(&publishers, snapshot.global()).into_bytes(),
            ArtifactHint::UNIQUE,
        ),
        Artifact::content(
            "/statistics.html",
            Mime::TextHtml,
            stats_page_html("ZimFiction", snapshot.global()).into_bytes(),
            ArtifactHint::UNIQUE,
        ),
        Artifact::content(
            "/info/index.html",
            Mime::TextHtml,
            info_index_html().into_bytes(),
            ArtifactHint::UNIQUE,
        ),
        Artifact::content(
            "/info/acknowledgements.html",
            Mime::TextHtml,
            info_acknowledgements_html().into_bytes(),
            ArtifactHint::UNIQUE,
        ),
    ];

    for asset in zimfiction_assets::ALL {
        artifacts.push(Artifact::content(
            format!("/{}", asset.path),
            asset_mime(asset.mime),
            asset.bytes.to_vec(),
            ArtifactHint::SHARED,
        ));
    }

    Ok(JobOutput::artifacts_only(artifacts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use zimfiction_store::InMemoryStore;
    use zimfiction_types::{Author, Chapter, SeriesMember, Status};

    fn story(id: u64, publisher: &str, author: &str) -> Story {
        Story {
            id,
            publisher: publisher.to_string(),
            author_ref: Author { name: author.to_string(), publisher: publisher.to_string(), url: String::new() },
            title: format!("Story {id}"),
            summary_html: "<p>summary</p>".into(),
            language: "en".into(),
            status: Status::Completed,
            rating: None,
            url: String::new(),
            published_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            updated_date: NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
            packaged_date: NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(),
            source_group: String::new(),
            source_name: String::new(),
            score: 0,
            chapters: vec![Chapter { index: 1, title: "C1".into(), text_html: "hello world".into() }],
            tags: BTreeSet::new(),
        }
    }

    #[test]
    fn story_card_html_includes_visible_tags() {
        use zimfiction_types::Tag;
        let mut s = story(1, "Demo", "Alice");
        s.tags.insert(Tag::new(TagType::Genre, "Fluff", false));
        s.tags.insert(Tag::new(TagType::Status, "completed", false));
        let html = story_card_html(&s);
        assert!(html.contains("Fluff"));
        assert!(!html.contains(">completed<"));
    }

    #[test]
    fn story_card_html_omits_the_tag_separator_when_no_visible_tags() {
        let s = story(1, "Demo", "Alice");
        let html = story_card_html(&s);
        assert!(!html.contains("&mdash; <"));
    }

    fn sealed_snapshot(stories: &[Story]) -> Arc<AggregatorSnapshot> {
        let mut agg = Aggregator::new();
        for s in stories {
            agg.record_story(s);
        }
        Arc::new(agg.seal())
    }

    #[test]
    fn author_jobs_emits_one_job_per_distinct_author() {
        let stories = vec![story(1, "Demo", "Alice"), story(2, "Demo", "Bob")];
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new(stories.clone(), vec![]));
        let snapshot = sealed_snapshot(&stories);
        let jobs = author_jobs(&store, &snapshot).unwrap();
        assert_eq!(jobs.len(), 2);
    }

    #[test]
    fn author_jobs_detects_slug_collisions() {
        let stories = vec![story(1, "Demo", "a b"), story(2, "Demo", "a+b")];
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new(stories.clone(), vec![]));
        let snapshot = sealed_snapshot(&stories);
        let err = author_jobs(&store, &snapshot).unwrap_err();
        assert!(matches!(err, BuildError::Plan(_)));
    }

    #[test]
    fn render_author_entity_produces_a_listing_and_a_chart() {
        let stories = vec![story(1, "Demo", "Alice")];
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new(stories.clone(), vec![]));
        let snapshot = sealed_snapshot(&stories);
        let output = render_author_entity(&store, &snapshot, "Demo", "Alice").unwrap();
        let paths: Vec<&str> = output.artifacts.iter().map(|a| a.path.as_str()).collect();
        assert!(paths.contains(&"/author/Demo/Alice/1"));
        assert!(paths.contains(&"/author/Demo/Alice/storyupdates.json"));
    }

    #[test]
    fn render_author_entity_links_alt_identities_across_publishers() {
        let stories = vec![story(1, "Demo", "Alice"), story(2, "Other", "Alice")];
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new(stories.clone(), vec![]));
        let snapshot = sealed_snapshot(&stories);

        let output = render_author_entity(&store, &snapshot, "Demo", "Alice").unwrap();
        let alt = output
            .artifacts
            .iter()
            .find(|a| a.path == "/author/Demo/Alice/alt_identities.html")
            .expect("alt identities artifact");
        let zimfiction_zim::ArtifactBody::Content(bytes) = &alt.body else { panic!("expected content") };
        let html = String::from_utf8(bytes.clone()).unwrap();
        assert!(html.contains("/author/Other/Alice/1"));
        assert!(!html.contains("/author/Demo/Alice/1"));
    }

    #[test]
    fn render_author_entity_omits_alt_identities_when_only_one_publisher() {
        let stories = vec![story(1, "Demo", "Alice")];
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new(stories.clone(), vec![]));
        let snapshot = sealed_snapshot(&stories);

        let output = render_author_entity(&store, &snapshot, "Demo", "Alice").unwrap();
        assert!(!output.artifacts.iter().any(|a| a.path.ends_with("alt_identities.html")));
    }

    #[test]
    fn series_jobs_reads_directly_from_the_store() {
        let stories = vec![story(1, "Demo", "Alice"), story(2, "Demo", "Alice")];
        let series = Series {
            name: "Saga".into(),
            publisher: "Demo".into(),
            members: vec![
                SeriesMember { story_publisher: "Demo".into(), story_id: 1, index: 1 },
                SeriesMember { story_publisher: "Demo".into(), story_id: 2, index: 2 },
            ],
        };
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new(stories, vec![series]));
        let jobs = series_jobs(&store).unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn render_series_entity_fails_on_a_dangling_member() {
        let series = Series {
            name: "Saga".into(),
            publisher: "Demo".into(),
            members: vec![SeriesMember { story_publisher: "Demo".into(), story_id: 99, index: 1 }],
        };
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new(vec![], vec![]));
        let err = render_series_entity(&store, &series).unwrap_err();
        assert!(matches!(err, RenderError::InputCorruption(_)));
    }

    #[test]
    fn tag_jobs_groups_slug_collisions_by_tag_type() {
        use zimfiction_types::Tag;
        let mut s1 = story(1, "Demo", "Alice");
        s1.tags.insert(Tag::new(TagType::Genre, "a b", false));
        let mut s2 = story(2, "Demo", "Bob");
        s2.tags.insert(Tag::new(TagType::Genre, "a+b", false));
        let stories = vec![s1, s2];
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new(stories.clone(), vec![]));
        let snapshot = sealed_snapshot(&stories);
        let series_index = Arc::new(BTreeMap::new());
        let err = tag_jobs(&store, &snapshot, &series_index, SearchIndexOptions::default()).unwrap_err();
        assert!(matches!(err, BuildError::Plan(_)));
    }

    #[test]
    fn category_jobs_emits_one_job_per_publisher_category_pair() {
        use zimfiction_types::Tag;
        let mut s1 = story(1, "Demo", "Alice");
        s1.tags.insert(Tag::new(TagType::Category, "Fluff", false));
        let stories = vec![s1];
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new(stories.clone(), vec![]));
        let snapshot = sealed_snapshot(&stories);
        let series_index = Arc::new(BTreeMap::new());
        let jobs = category_jobs(&store, &snapshot, &series_index, SearchIndexOptions::default()).unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn publisher_jobs_emits_one_job_per_publisher() {
        let stories = vec![story(1, "Demo", "Alice"), story(2, "Other", "Bob")];
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new(stories.clone(), vec![]));
        let snapshot = sealed_snapshot(&stories);
        let jobs = publisher_jobs(&store, &snapshot).unwrap();
        assert_eq!(jobs.len(), 2);
    }

    #[test]
    fn global_jobs_emits_every_static_asset_and_the_root_redirect() {
        let snapshot = sealed_snapshot(&[story(1, "Demo", "Alice")]);
        let jobs = global_jobs(&snapshot);
        assert_eq!(jobs.len(), 1);
        let Job::Custom(f) = jobs.into_iter().next().unwrap() else { panic!("expected a custom job") };
        let output = f(&zimfiction_render::RenderOptions::default()).unwrap();
        let paths: Vec<&str> = output.artifacts.iter().map(|a| a.path.as_str()).collect();
        assert!(paths.contains(&"/"));
        assert!(paths.contains(&"/index.html"));
        assert!(paths.contains(&"/statistics.html"));
        assert!(paths.contains(&"/favicon.png"));
        assert!(paths.contains(&"/scripts/search.js"));
    }

    #[test]
    fn build_series_index_maps_every_member() {
        let series = Series {
            name: "Saga".into(),
            publisher: "Demo".into(),
            members: vec![SeriesMember { story_publisher: "Demo".into(), story_id: 1, index: 1 }],
        };
        let store = InMemoryStore::new(vec![], vec![series]);
        let index = build_series_index(&store).unwrap();
        assert_eq!(index.get(&("Demo".to_string(), 1)), Some(&vec![("Saga".to_string(), 1)]));
    }
}
