//! Normalized activity feed model
//!
//! Every platform client reduces its upstream shape to the same `Post`
//! struct, so the route layer and the merged timeline never care where an
//! item came from. Helpers for the recurring HTML chores (thumbnail
//! extraction, tag stripping, mixed-content rewriting) live here too.

pub mod rss;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Platform a post originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Github,
    HatenaBlog,
    HatenaBookmark,
    Zenn,
    Note,
    Booklog,
    Filmarks,
    Spotify,
    Tenhou,
    Ff14,
}

/// A normalized activity item from any platform
///
/// `description` is an empty string when the upstream carries no summary,
/// and `thumbnail` is omitted from the JSON output entirely when absent;
/// consumers never see `null`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Display title
    pub title: String,
    /// Canonical URL of the item
    pub url: String,
    /// When the activity happened
    pub date: DateTime<Utc>,
    /// Plain-text summary, empty when unavailable
    pub description: String,
    /// Preview image URL, if the upstream provides one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Originating platform
    pub source: Source,
}

/// Sorts posts by date, newest first
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.date.cmp(&a.date));
}

/// Rewrites an `http://` URL to `https://`
///
/// Upstream markup still embeds plain-http image URLs; serving them as-is
/// would trip mixed-content blocking in browsers.
pub fn force_https(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

/// Extracts the `src` of the first `<img>` tag in an HTML fragment
///
/// Returns the URL with `http://` already rewritten to `https://`.
/// Tolerates single or double quoted attributes and mixed-case tags;
/// anything it cannot make sense of resolves to `None`.
pub fn first_img_src(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let mut from = 0;
    while let Some(rel) = lower[from..].find("<img") {
        let start = from + rel;
        let tag_end = match lower[start..].find('>') {
            Some(i) => start + i,
            None => break,
        };
        let tag = &html[start..tag_end];
        let tag_lower = &lower[start..tag_end];
        if let Some(attr) = tag_lower.find("src=") {
            let rest = &tag[attr + 4..];
            if let Some(quote @ ('"' | '\'')) = rest.chars().next() {
                if let Some(end) = rest[1..].find(quote) {
                    let src = &rest[1..1 + end];
                    if !src.is_empty() {
                        return Some(force_https(src));
                    }
                }
            }
        }
        from = tag_end + 1;
    }
    None
}

/// Strips markup from an HTML fragment and collapses whitespace
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
