//! # Assets
//!
//! The handful of static, pre-built assets the build stage emits
//! unconditionally (spec.md §4 phase 6, §6.2): the favicon, both
//! stylesheet theme variants, and the three scripts loaded inside the
//! ZIM (`search.js` for §4.5's `ClientSearchEngine`, `chart.js` and
//! `storytimechart.js` for the per-entity chart-data pages).
//!
//! Generating these (icon rendering, stylesheet compilation) is an
//! explicit non-goal (spec.md §1); this crate only carries the already-
//! built bytes and the path/MIME pairs the planner needs to emit them.

/// One static asset: its ZIM path, MIME type, and content bytes.
#[derive(Debug, Clone, Copy)]
pub struct Asset {
    pub path: &'static str,
    pub mime: &'static str,
    pub bytes: &'static [u8],
}

pub const FAVICON: Asset = Asset {
    path: "favicon.png",
    mime: "image/png",
    bytes: include_bytes!("favicon.png"),
};

pub const STYLE_LIGHT: Asset = Asset {
    path: "style_light.css",
    mime: "text/css",
    bytes: include_bytes!("style_light.css"),
};

pub const STYLE_DARK: Asset = Asset {
    path: "style_dark.css",
    mime: "text/css",
    bytes: include_bytes!("style_dark.css"),
};

pub const SCRIPT_SEARCH: Asset = Asset {
    path: "scripts/search.js",
    mime: "application/javascript",
    bytes: include_bytes!("scripts/search.js"),
};

pub const SCRIPT_CHART: Asset = Asset {
    path: "scripts/chart.js",
    mime: "application/javascript",
    bytes: include_bytes!("scripts/chart.js"),
};

pub const SCRIPT_STORYTIMECHART: Asset = Asset {
    path: "scripts/storytimechart.js",
    mime: "application/javascript",
    bytes: include_bytes!("scripts/storytimechart.js"),
};

/// Every static asset the build stage emits, in no particular order.
pub const ALL: &[Asset] = &[
    FAVICON,
    STYLE_LIGHT,
    STYLE_DARK,
    SCRIPT_SEARCH,
    SCRIPT_CHART,
    SCRIPT_STORYTIMECHART,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_asset_has_nonempty_bytes() {
        for asset in ALL {
            assert!(!asset.bytes.is_empty(), "{} is empty", asset.path);
        }
    }

    #[test]
    fn paths_are_unique() {
        let mut paths: Vec<&str> = ALL.iter().map(|a| a.path).collect();
        paths.sort_unstable();
        let mut deduped = paths.clone();
        deduped.dedup();
        assert_eq!(paths.len(), deduped.len());
    }

    #[test]
    fn favicon_is_a_png() {
        assert_eq!(&FAVICON.bytes[0..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn search_script_exposes_the_documented_globals() {
        let src = std::str::from_utf8(SCRIPT_SEARCH.bytes).unwrap();
        assert!(src.contains("ZimFictionSearch"));
        assert!(src.contains("SearchEngine"));
    }
}
