//! Section discovery: pull navigation links out of a homepage and keep
//! the ones that look like standing section fronts.
//!
//! Pure HTML-in, URLs-out. Ordering follows document order, first
//! occurrence wins, and the result is capped at
//! [`MAX_SECTIONS_PER_SOURCE`].

use scraper::{Html, Selector};
use url::Url;

use crate::models::MAX_SECTIONS_PER_SOURCE;

/// Path segments that mark a link as a section front. Matching is on
/// whole segments, lowercased: `/local-news/` does not match `local`.
const SECTION_VOCABULARY: &[&str] = &[
    "news",
    "local",
    "sports",
    "weather",
    "politics",
    "business",
    "entertainment",
    "opinion",
    "lifestyle",
    "community",
];

/// File extensions and segments that mark a link as a feed or sitemap
/// rather than an HTML section front.
const FEED_EXTENSIONS: &[&str] = &[".xml", ".rss", ".atom"];
const FEED_SEGMENTS: &[&str] = &["feed", "rss", "atom", "sitemap"];

/// Anchors inside navigation structures. Class substring matches catch
/// the common `nav-primary` / `menu-main` naming without needing
/// per-site selectors.
const NAV_LINK_SELECTOR: &str = concat!(
    "nav a[href], ",
    "header a[href], ",
    "[role=\"navigation\"] a[href], ",
    "[class*=\"nav\"] a[href], ",
    "[class*=\"menu\"] a[href]"
);

/// Extract section-front URLs from homepage HTML.
///
/// Keeps http/https links on the same host as `base_url` whose path
/// contains a vocabulary segment, rejects feed-looking links, strips
/// query and fragment, dedupes preserving first occurrence, and caps
/// the result.
pub fn discover_sections(html: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let Some(base_host) = base.host_str().map(str::to_lowercase) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let selector =
        Selector::parse(NAV_LINK_SELECTOR).unwrap_or_else(|_| unreachable!("static selector"));

    let mut seen = std::collections::HashSet::new();
    let mut sections = Vec::new();

    for element in document.select(&selector) {
        if sections.len() >= MAX_SECTIONS_PER_SOURCE {
            break;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };

        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        if resolved.host_str().map(str::to_lowercase).as_deref() != Some(base_host.as_str()) {
            continue;
        }
        if !is_section_path(resolved.path()) {
            continue;
        }

        resolved.set_query(None);
        resolved.set_fragment(None);
        let url = resolved.to_string();
        if seen.insert(url.clone()) {
            sections.push(url);
        }
    }

    sections
}

/// Whether a path names a section front: at least one whole segment
/// from the vocabulary, and nothing feed-shaped anywhere in the path.
fn is_section_path(path: &str) -> bool {
    let lower = path.to_lowercase();

    if FEED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return false;
    }

    let segments: Vec<&str> = lower.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| FEED_SEGMENTS.contains(s)) {
        return false;
    }

    segments.iter().any(|s| SECTION_VOCABULARY.contains(s))
}
