//! # Templates
//!
//! The Template & Filter registry (spec.md §4.7, §9): a small, closed set
//! of named pure functions invoked while rendering entity pages, plus the
//! pagination-window layout function shared by server-rendered list pages
//! and the client search engine (§4.2, §4.5, §8 property 4).
//!
//! Filter extensibility is an explicit non-goal (§9): this module is a
//! fixed function table, not a plugin registry.

use chrono::NaiveDate;
use zimfiction_types::{Story, Tag};

/// HTML-entity escapes `&`, `<`, `>`, `"`, `'`.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Removes every `<...>` tag, leaving only text content.
pub fn striptags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// `YYYY-MM-DD` → human `Month D, YYYY`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Thousands-grouped integer, e.g. `1234567` → `"1,234,567"`.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// URL slug for a tag/author/series name. Delegates to
/// [`zimfiction_types::normalize`] so server and client agree (§6.3).
pub fn normalize_tag(name: &str) -> String {
    zimfiction_types::normalize(name)
}

/// One tag rendered as an inline link to its listing page (§4.2). Shared
/// by the compact and extended story cards so both agree on markup.
fn tag_link_html(tag: &Tag) -> String {
    format!(
        "<a class=\"tag tag-{type}\" href=\"/tag/{type}/{slug}/1\">{name}</a>",
        type = tag.tag_type.search_field_name(),
        slug = tag.slug(),
        name = escape(&tag.name),
    )
}

/// The comma-joined list of a story's visible tags (§3's
/// `ordered_visible_tags` invariant), as inline links. Empty string when
/// the story carries no non-first-class tags.
pub fn visible_tags_html(story: &Story) -> String {
    story
        .ordered_visible_tags()
        .into_iter()
        .map(tag_link_html)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fixes unbalanced HTML tags and drops disallowed elements from chapter
/// text (§4.2). `strip_external_links` implements `--no-external-links`
/// (§3): any `<a href=...>` whose target is not a same-ZIM
/// path has its tag removed, keeping the link text.
pub fn repair_html(input: &str, strip_external_links: bool) -> String {
    const DISALLOWED: &[&str] = &["script", "iframe", "object", "embed", "form"];
    let mut stack: Vec<String> = Vec::new();
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '<' {
            out.push(c);
            continue;
        }
        let Some(end) = input[i..].find('>') else {
            out.push(c);
            continue;
        };
        let raw_tag = &input[i + 1..i + end];
        let end_byte = i + end + 1;
        while let Some(&(j, _)) = chars.peek() {
            if j < end_byte {
                chars.next();
            } else {
                break;
            }
        }

        let is_closing = raw_tag.starts_with('/');
        let name_src = raw_tag.trim_start_matches('/');
        let name: String = name_src
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();

        if DISALLOWED.contains(&name.as_str()) {
            continue;
        }

        if name == "a" && !is_closing && strip_external_links && !is_same_zim_link(name_src) {
            continue;
        }

        if is_closing {
            if let Some(pos) = stack.iter().rposition(|t| t == &name) {
                stack.truncate(pos);
                out.push('<');
                out.push('/');
                out.push_str(&name);
                out.push('>');
            }
            // unmatched closing tag: drop silently, balances the output.
        } else {
            let self_closing = raw_tag.trim_end().ends_with('/')
                || matches!(name.as_str(), "br" | "img" | "hr");
            out.push('<');
            out.push_str(raw_tag);
            out.push('>');
            if !self_closing {
                stack.push(name);
            }
        }
    }

    for tag in stack.into_iter().rev() {
        out.push('<');
        out.push('/');
        out.push_str(&tag);
        out.push('>');
    }

    out
}

fn is_same_zim_link(tag_attrs: &str) -> bool {
    let Some(href_start) = tag_attrs.find("href=") else {
        return true; // no href: nothing to strip
    };
    let rest = &tag_attrs[href_start + 5..];
    let quote = rest.chars().next();
    let href = match quote {
        Some(q @ ('"' | '\'')) => rest[1..].split(q).next().unwrap_or(""),
        _ => rest.split(|c: char| c.is_whitespace() || c == '>').next().unwrap_or(""),
    };
    !href.contains("://") && !href.starts_with("//")
}

/// A chapter-anchor id for in-page navigation, e.g. `"p3"` for paragraph 3.
fn paragraph_anchor(index: usize) -> String {
    format!("p{index}")
}

/// `repair_html` plus paragraph anchors, used for the main chapter body
/// (§4.7).
pub fn render_storytext(input: &str, strip_external_links: bool) -> String {
    let repaired = repair_html(input, strip_external_links);
    let mut out = String::with_capacity(repaired.len());
    let mut para_index = 0usize;
    let mut rest = repaired.as_str();
    while let Some(pos) = rest.find("<p>") {
        out.push_str(&rest[..pos]);
        out.push_str(&format!("<p id=\"{}\">", paragraph_anchor(para_index)));
        para_index += 1;
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    out
}

/// `list[i]` or `fallback` when out of range — used by templates instead
/// of panicking on short lists.
pub fn default_index<'a, T>(list: &'a [T], i: usize, fallback: &'a T) -> &'a T {
    list.get(i).unwrap_or(fallback)
}

/// One rendered pagination control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEntry {
    Page(u32),
    Ellipsis,
}

/// The "around-current" pagination window (§4.2, §4.5, §8 property 4):
/// always includes `[max(1, cur-2), min(num_pages, cur+2)]`, plus anchors
/// to page 1 / `num_pages` when they fall outside that window. A single
/// page hidden between an anchor and the window is shown directly rather
/// than collapsed behind an ellipsis; two or more are collapsed.
///
/// Returns an empty list when there is nothing to paginate
/// (`num_pages <= 1`).
pub fn pagination_window(cur_page: u32, num_pages: u32) -> Vec<PageEntry> {
    if num_pages <= 1 {
        return Vec::new();
    }
    let cur = cur_page.clamp(1, num_pages);
    let window_start = cur.saturating_sub(2).max(1);
    let window_end = (cur + 2).min(num_pages);

    let mut out = Vec::new();

    if window_start > 1 {
        out.push(PageEntry::Page(1));
        let hidden = window_start - 2; // pages strictly between 1 and window_start
        match hidden {
            0 => {}
            1 => out.push(PageEntry::Page(2)),
            _ => out.push(PageEntry::Ellipsis),
        }
    }

    for p in window_start..=window_end {
        out.push(PageEntry::Page(p));
    }

    if window_end < num_pages {
        let hidden = num_pages - window_end - 1; // pages strictly between window_end and num_pages
        match hidden {
            0 => {}
            1 => out.push(PageEntry::Page(window_end + 1)),
            _ => out.push(PageEntry::Ellipsis),
        }
        out.push(PageEntry::Page(num_pages));
    }

    out
}

/// Number of pages needed to hold `n` items at `per_page` items each.
pub fn ceil_div(n: u64, per_page: u64) -> u64 {
    if n == 0 {
        0
    } else {
        n.div_ceil(per_page)
    }
}
