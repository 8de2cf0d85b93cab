//! HTML parser for extracting links and page records
//!
//! This module handles parsing fetched pages to extract:
//! - Links to follow (from <a> tags)
//! - The page title, which becomes the saved record

use crate::capability::{DiscoveredLink, Page, ParseOutcome, Parser};
use crate::url::normalize_url;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use serde::Serialize;
use url::Url;

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// All links found on the page (absolute, normalized URLs)
    pub links: Vec<String>,
}

/// The record saved for each page that has a title
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRecord {
    pub title: String,
    pub fetched_at: DateTime<Utc>,
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only links
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - The base URL for resolving relative links
///
/// # Returns
///
/// The title and links found in the document
///
/// # Example
///
/// ```
/// use tide_crawl::capability::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links, vec!["https://example.com/page".to_string()]);
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        links: extract_links(&document, base_url),
    }
}

/// Extracts the page title, collapsing whitespace
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| clean_title(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

/// Removes non-breaking spaces and collapses runs of whitespace
fn clean_title(raw: &str) -> String {
    raw.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts all followable links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            // Skip if it has the download attribute
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, base_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    links
}

/// Resolves a link href to a normalized absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid or non-HTTP(S) URLs
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    normalize_url(absolute.as_str()).ok().map(String::from)
}

/// Default parse capability for HTML pages
///
/// Follows links only while the page's depth is below `max_depth` (or
/// always, when no bound is set). Each link inherits the page's keys and gets
/// priority `depth + 1`.
#[derive(Debug, Clone, Default)]
pub struct HtmlParser {
    max_depth: Option<u32>,
}

impl HtmlParser {
    /// Creates a parser with an optional depth bound
    pub fn new(max_depth: Option<u32>) -> Self {
        Self { max_depth }
    }

    /// Returns whether links found at `depth` should be followed
    pub fn follows_links_at(&self, depth: u32) -> bool {
        self.max_depth.map_or(true, |max| depth < max)
    }
}

fn is_html(content_type: &str) -> bool {
    content_type.is_empty()
        || content_type.contains("text/html")
        || content_type.contains("application/xhtml")
}

#[async_trait]
impl<K: Clone + Send + Sync> Parser<K, Page, PageRecord> for HtmlParser {
    async fn parse(
        &self,
        _priority: u32,
        url: &str,
        keys: &K,
        depth: u32,
        content: &Page,
    ) -> ParseOutcome<K, PageRecord> {
        if !is_html(&content.content_type) {
            tracing::debug!(
                "Skipping {}: content type {} is not HTML",
                url,
                content.content_type
            );
            return ParseOutcome::Failure;
        }

        let base_url = match Url::parse(&content.final_url).or_else(|_| Url::parse(url)) {
            Ok(base) => base,
            Err(e) => {
                tracing::warn!("Cannot resolve links for {}: {}", url, e);
                return ParseOutcome::Failure;
            }
        };

        let parsed = parse_html(&content.body, &base_url);

        let links = if self.follows_links_at(depth) {
            parsed
                .links
                .into_iter()
                .map(|link| DiscoveredLink {
                    url: link,
                    keys: keys.clone(),
                    priority: depth + 1,
                })
                .collect()
        } else {
            Vec::new()
        };

        let records = parsed
            .title
            .map(|title| PageRecord {
                title,
                fetched_at: Utc::now(),
            })
            .into_iter()
            .collect();

        ParseOutcome::Success { links, records }
    }
}
