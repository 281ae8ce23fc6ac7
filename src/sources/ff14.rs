//! FF14 Lodestone achievements client
//!
//! The Lodestone lists a character's latest achievements; each entry links
//! to a detail page carrying the unlock timestamp. Details are memoized in
//! the `ff14-achievements` dataset with a short TTL, since the listing
//! changes day to day.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::cache::CacheStore;
use crate::feed::{sort_newest_first, Post, Source};
use crate::fetch::FetchPolicy;
use crate::sources::resolve_with_cache;

/// Base URL of the Japanese Lodestone
const LODESTONE_BASE: &str = "https://jp.finalfantasyxiv.com";

/// Cache dataset holding per-achievement unlock records
const DATASET: &str = "ff14-achievements";

/// Title shown when a detail page cannot be read
const UNKNOWN_TITLE: &str = "アチーブメント";

/// Errors that can occur when fetching the achievement listing
#[derive(Debug, Error)]
pub enum Ff14Error {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// Cached per-achievement payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    /// When the achievement was unlocked
    pub date: DateTime<Utc>,
    /// Achievement name
    pub title: String,
}

/// Client for a character's Lodestone achievements
pub struct Ff14Client {
    http: Client,
    character_id: String,
    store: CacheStore,
    policy: FetchPolicy,
}

impl Ff14Client {
    pub fn new(
        http: Client,
        character_id: impl Into<String>,
        store: CacheStore,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            http,
            character_id: character_id.into(),
            store,
            policy,
        }
    }

    /// Fetches the achievement listing and resolves unlock records
    pub async fn fetch_posts(&self) -> Result<Vec<Post>, Ff14Error> {
        let url = format!(
            "{}/lodestone/character/{}/achievement/",
            LODESTONE_BASE, self.character_id
        );
        let page = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let links = parse_achievement_links(&page, LODESTONE_BASE);

        let http = self.http.clone();
        let records = resolve_with_cache(&self.store, DATASET, &self.policy, &links, move |url| {
            let http = http.clone();
            async move {
                let page = match fetch_text(&http, &url).await {
                    Ok(page) => page,
                    Err(err) => {
                        warn!(url, error = %err, "lodestone detail fetch failed");
                        return None;
                    }
                };
                parse_achievement_detail(&page)
            }
        })
        .await;

        let mut posts: Vec<Post> = links
            .into_iter()
            .map(|link| {
                let record = records.get(&link).cloned();
                Post {
                    title: record
                        .as_ref()
                        .map(|r| format!("アチーブメント「{}」を達成", r.title))
                        .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
                    date: record
                        .as_ref()
                        .map(|r| r.date)
                        .unwrap_or(DateTime::UNIX_EPOCH),
                    description: String::new(),
                    thumbnail: None,
                    url: link,
                    source: Source::Ff14,
                }
            })
            .collect();
        sort_newest_first(&mut posts);
        Ok(posts)
    }
}

async fn fetch_text(http: &Client, url: &str) -> Result<String, reqwest::Error> {
    http.get(url).send().await?.error_for_status()?.text().await
}

/// Collects achievement detail links from the listing markup
fn parse_achievement_links(html: &str, base: &str) -> Vec<String> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();
    let mut from = 0;

    while let Some(rel) = html[from..].find("href=\"") {
        let start = from + rel + "href=\"".len();
        from = start;
        let Some(len) = html[start..].find('"') else {
            break;
        };
        let path = &html[start..start + len];
        if !path.contains("/achievement/detail/") {
            continue;
        }
        let url = if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            path.to_string()
        };
        if seen.insert(url.clone()) {
            links.push(url);
        }
    }

    links
}

/// Extracts the unlock time and achievement name from a detail page
///
/// The Lodestone renders timestamps through an `ldst_strftime(<epoch>,..)`
/// script call; the name comes from the og:title meta.
fn parse_achievement_detail(html: &str) -> Option<Achievement> {
    let pos = html.find("ldst_strftime(")?;
    let epoch: i64 = html[pos + "ldst_strftime(".len()..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .ok()?;
    let date = DateTime::from_timestamp(epoch, 0)?;

    let title = achievement_name(html).unwrap_or_else(|| UNKNOWN_TITLE.to_string());
    Some(Achievement { date, title })
}

/// Reads the achievement name out of the og:title meta content
///
/// The Lodestone puts the name in 「」 quotes inside a longer page title.
fn achievement_name(html: &str) -> Option<String> {
    let pos = html.find("property=\"og:title\"")?;
    let tag_start = html[..pos].rfind('<')?;
    let tag_end = pos + html[pos..].find('>')?;
    let tag = &html[tag_start..=tag_end];

    let content_pos = tag.find("content=\"")?;
    let value_start = content_pos + "content=\"".len();
    let value_len = tag[value_start..].find('"')?;
    let value = &tag[value_start..value_start + value_len];

    if let (Some(open), Some(close)) = (value.find('「'), value.find('」')) {
        if open < close {
            let inner = value[open + '「'.len_utf8()..close].trim();
            if !inner.is_empty() {
                return Some(inner.to_string());
            }
        }
    }
    let trimmed = value.split('|').next().unwrap_or(value).trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
