//! Outlink extraction from HTML documents
//!
//! This is a pure function over a document: it never fetches anything and
//! never fails. Unparseable markup simply yields fewer links.

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Elements and attributes that lead to another crawlable page
const LINK_SELECTORS: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("area[href]", "href"),
    ("link[rel='canonical'][href]", "href"),
    ("iframe[src]", "src"),
];

/// Extracts the set of outlinks from an HTML document
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href>` and `<area href>` anywhere in the document
/// - `<link rel="canonical" href>`
/// - `<iframe src>`
///
/// **Exclude:**
/// - `<a href download>`
/// - `javascript:`, `mailto:`, `tel:` and `data:` links
/// - Fragment-only links (same page anchors)
/// - Anything that is not http(s) after resolution
///
/// Relative links resolve against `<base href>` when the document has one,
/// otherwise against `base_url`. Fragments are stripped so `/a#x` and
/// `/a#y` count as the same outlink.
///
/// # Example
///
/// ```
/// use sumi_archiver::crawler::extract_outlinks;
/// use url::Url;
///
/// let html = r#"<html><body><a href="/page#top">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let links = extract_outlinks(html, &base_url);
/// assert!(links.contains(&Url::parse("https://example.com/page").unwrap()));
/// ```
pub fn extract_outlinks(html: &str, base_url: &Url) -> HashSet<Url> {
    let document = Html::parse_document(html);
    let base = document_base(&document, base_url);

    let mut links = HashSet::new();
    for (selector, attr) in LINK_SELECTORS {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };

        for element in document.select(&selector) {
            // Skip if it has the download attribute
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(url) = element.value().attr(attr).and_then(|v| resolve_link(v, &base)) {
                links.insert(url);
            }
        }
    }

    links
}

/// The URL relative links resolve against
fn document_base(document: &Html, base_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|element| element.value().attr("href"))
                .and_then(|href| base_url.join(href.trim()).ok())
        })
        .unwrap_or_else(|| base_url.clone())
}

/// Resolves a link to an absolute http(s) URL without fragment
///
/// Returns None if the link should be excluded.
pub(crate) fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }
    absolute_url.set_fragment(None);
    Some(absolute_url)
}
