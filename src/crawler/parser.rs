//! HTML parser for extracting links and metadata
//!
//! This module handles parsing HTML content to extract:
//! - Candidate links (from <a> tags and canonical links), as written in the page
//! - The page title
//! - `<meta>` name/property pairs
//! - The effective `<base href>`
//!
//! Links are returned raw; resolution and filtering happen in `url::normalize`.

use scraper::{Html, Selector};
use std::collections::BTreeMap;
use url::Url;

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// `<meta>` values keyed by `name` or `property` (lowercased)
    pub metadata: BTreeMap<String, String>,

    /// Link targets in document order, unresolved
    pub links: Vec<String>,

    /// Value of the first `<base href>`, if any
    pub base_href: Option<String>,
}

impl ParsedPage {
    /// Base URL for resolving this page's relative links
    ///
    /// A `<base href>` wins when it resolves against the page URL.
    pub fn effective_base(&self, page_url: &Url) -> Url {
        self.base_href
            .as_deref()
            .and_then(|href| page_url.join(href).ok())
            .filter(|base| matches!(base.scheme(), "http" | "https"))
            .unwrap_or_else(|| page_url.clone())
    }
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<link rel="stylesheet" ...>`, `<script src>`, `<img src>`
/// - `<a href="..." download>`
/// - Empty hrefs
///
/// `rel="nofollow"` links are kept. Malformed markup never fails; the
/// parser recovers and returns whatever it could read.
///
/// # Example
///
/// ```
/// use sumi_crawl::crawler::parse_page;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let parsed = parse_page(html);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links, vec!["/page".to_string()]);
/// ```
pub fn parse_page(html: &str) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        metadata: extract_metadata(&document),
        links: collect_links(&document),
        base_href: extract_base_href(&document),
    }
}

/// Extracts the links of a page resolved against `base_url`
///
/// `<base href>` takes precedence over `base_url`. Hrefs that do not resolve
/// are dropped.
pub fn extract_links(html: &str, base_url: &Url) -> Vec<String> {
    let page = parse_page(html);
    let base = page.effective_base(base_url);
    page.links
        .iter()
        .filter_map(|href| base.join(href).ok())
        .map(String::from)
        .collect()
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn extract_metadata(document: &Html) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    let Ok(meta_selector) = Selector::parse("meta[content]") else {
        return metadata;
    };

    for element in document.select(&meta_selector) {
        let attrs = element.value();
        let key = attrs.attr("name").or_else(|| attrs.attr("property"));
        let (Some(key), Some(content)) = (key, attrs.attr("content")) else {
            continue;
        };

        let key = key.trim().to_ascii_lowercase();
        let content = content.trim();
        if key.is_empty() || content.is_empty() {
            continue;
        }

        // First occurrence wins
        metadata
            .entry(key)
            .or_insert_with(|| content.to_string());
    }

    metadata
}

fn extract_base_href(document: &Html) -> Option<String> {
    let base_selector = Selector::parse("base[href]").ok()?;

    document
        .select(&base_selector)
        .next()
        .and_then(|element| element.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
}

/// Collects link targets from anchors and canonical links
fn collect_links(document: &Html) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            // Skip if it has the download attribute
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href").map(str::trim) {
                if !href.is_empty() {
                    links.push(href.to_string());
                }
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href").map(str::trim) {
                if !href.is_empty() {
                    links.push(href.to_string());
                }
            }
        }
    }

    links
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
