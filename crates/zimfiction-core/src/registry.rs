//! The template registry (§9: "Dynamic template dispatch ... becomes a
//! template registry keyed by a stable enum of known templates"). Every
//! template here is a plain Rust function in [`crate::pages`]; this enum
//! gives phase-reporting code ([`crate::context::BuildContext::phase_started`])
//! a stable, closed name for each one, keyed to the phase
//! ([`zimfiction_events::Phase`]) that dispatches it, instead of a bare
//! string.

use zimfiction_events::Phase;

/// Every kind of page this crate knows how to render. Closed set — filter
/// and template extensibility are a non-goal (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TemplateId {
    StoryChapter,
    StoryIndex,
    AuthorListing,
    SeriesPage,
    TagListing,
    TagStats,
    CategoryListing,
    PublisherLanding,
    PublisherCategories,
    GlobalIndex,
    GlobalStatistics,
    InfoIndex,
    InfoAcknowledgements,
}

impl TemplateId {
    /// Every known template, in no particular order.
    pub const ALL: [TemplateId; 13] = [
        TemplateId::StoryChapter,
        TemplateId::StoryIndex,
        TemplateId::AuthorListing,
        TemplateId::SeriesPage,
        TemplateId::TagListing,
        TemplateId::TagStats,
        TemplateId::CategoryListing,
        TemplateId::PublisherLanding,
        TemplateId::PublisherCategories,
        TemplateId::GlobalIndex,
        TemplateId::GlobalStatistics,
        TemplateId::InfoIndex,
        TemplateId::InfoAcknowledgements,
    ];

    /// A short, human-readable label for reporter/log lines.
    pub fn label(self) -> &'static str {
        match self {
            TemplateId::StoryChapter => "story chapter",
            TemplateId::StoryIndex => "story index",
            TemplateId::AuthorListing => "author listing",
            TemplateId::SeriesPage => "series page",
            TemplateId::TagListing => "tag listing",
            TemplateId::TagStats => "tag stats",
            TemplateId::CategoryListing => "category listing",
            TemplateId::PublisherLanding => "publisher landing",
            TemplateId::PublisherCategories => "publisher categories",
            TemplateId::GlobalIndex => "global index",
            TemplateId::GlobalStatistics => "global statistics",
            TemplateId::InfoIndex => "info index",
            TemplateId::InfoAcknowledgements => "info acknowledgements",
        }
    }

    /// The build phase that dispatches this template's render jobs.
    pub fn phase(self) -> Phase {
        match self {
            TemplateId::StoryChapter | TemplateId::StoryIndex => Phase::PerStory,
            TemplateId::AuthorListing => Phase::PerAuthor,
            TemplateId::SeriesPage => Phase::PerSeries,
            TemplateId::TagListing | TemplateId::TagStats | TemplateId::CategoryListing => {
                Phase::PerCategoryOrTag
            }
            TemplateId::PublisherLanding | TemplateId::PublisherCategories => Phase::PerPublisher,
            TemplateId::GlobalIndex
            | TemplateId::GlobalStatistics
            | TemplateId::InfoIndex
            | TemplateId::InfoAcknowledgements => Phase::Global,
        }
    }

    /// Every template dispatched during `phase`, in `ALL` order. What
    /// [`crate::context::BuildContext::phase_started`] reports by name.
    pub fn for_phase(phase: Phase) -> Vec<TemplateId> {
        TemplateId::ALL
            .into_iter()
            .filter(|t| t.phase() == phase)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn every_known_template_has_a_distinct_label() {
        let labels: BTreeSet<&str> = TemplateId::ALL.iter().map(|t| t.label()).collect();
        assert_eq!(labels.len(), TemplateId::ALL.len());
    }

    #[test]
    fn every_known_template_belongs_to_exactly_one_phase_bucket() {
        for phase in [
            Phase::PerStory,
            Phase::PerAuthor,
            Phase::PerSeries,
            Phase::PerCategoryOrTag,
            Phase::PerPublisher,
            Phase::Global,
        ] {
            for template in TemplateId::for_phase(phase) {
                assert_eq!(template.phase(), phase);
            }
        }
        let total: usize = [
            Phase::PerStory,
            Phase::PerAuthor,
            Phase::PerSeries,
            Phase::PerCategoryOrTag,
            Phase::PerPublisher,
            Phase::Global,
        ]
        .iter()
        .map(|p| TemplateId::for_phase(*p).len())
        .sum();
        assert_eq!(total, TemplateId::ALL.len());
    }

    #[test]
    fn story_chapter_belongs_to_the_per_story_phase() {
        assert_eq!(TemplateId::StoryChapter.phase(), Phase::PerStory);
        assert!(TemplateId::for_phase(Phase::PerStory).contains(&TemplateId::StoryChapter));
    }
}
