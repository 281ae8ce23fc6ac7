//! Filmarks watch-history client
//!
//! The profile page lists recently reviewed films; the watch date lives on
//! each film's detail page and is memoized in the `filmarks` cache
//! dataset.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::cache::CacheStore;
use crate::feed::{sort_newest_first, strip_tags, Post, Source};
use crate::fetch::FetchPolicy;
use crate::sources::resolve_with_cache;

/// Base URL of the Filmarks site
const FILMARKS_BASE: &str = "https://filmarks.com";

/// Cache dataset holding per-film watch records
const DATASET: &str = "filmarks";

/// Errors that can occur when fetching the profile listing
#[derive(Debug, Error)]
pub enum FilmarksError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// Cached per-film payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchRecord {
    /// When the film was watched
    pub date: DateTime<Utc>,
    /// Display title from the detail page
    pub title: String,
}

/// One film extracted from the profile listing
#[derive(Debug, Clone, PartialEq)]
struct ListedFilm {
    title: String,
    url: String,
}

/// Client for a user's Filmarks watch history
pub struct FilmarksClient {
    http: Client,
    user: String,
    store: CacheStore,
    policy: FetchPolicy,
}

impl FilmarksClient {
    pub fn new(
        http: Client,
        user: impl Into<String>,
        store: CacheStore,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            http,
            user: user.into(),
            store,
            policy,
        }
    }

    /// Fetches the profile listing and resolves per-film watch records
    pub async fn fetch_posts(&self) -> Result<Vec<Post>, FilmarksError> {
        let url = format!("{}/users/{}", FILMARKS_BASE, self.user);
        let page = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let films = parse_listing(&page, FILMARKS_BASE);

        let keys: Vec<String> = films.iter().map(|film| film.url.clone()).collect();
        let http = self.http.clone();
        let records = resolve_with_cache(&self.store, DATASET, &self.policy, &keys, move |url| {
            let http = http.clone();
            async move {
                let page = match fetch_text(&http, &url).await {
                    Ok(page) => page,
                    Err(err) => {
                        warn!(url, error = %err, "filmarks detail fetch failed");
                        return None;
                    }
                };
                parse_detail(&page)
            }
        })
        .await;

        let mut posts: Vec<Post> = films
            .into_iter()
            .map(|film| {
                let record = records.get(&film.url).cloned();
                let title = record
                    .as_ref()
                    .filter(|r| !r.title.is_empty())
                    .map(|r| r.title.clone())
                    .unwrap_or(film.title);
                Post {
                    title,
                    date: record
                        .as_ref()
                        .map(|r| r.date)
                        .unwrap_or(DateTime::UNIX_EPOCH),
                    description: String::new(),
                    thumbnail: None,
                    url: film.url,
                    source: Source::Filmarks,
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

/// Extracts film links and titles from the profile listing markup
///
/// Looks for the content-card title blocks and reads the `/movies/...`
/// anchor inside each; repeated links to the same film collapse to one.
fn parse_listing(html: &str, base: &str) -> Vec<ListedFilm> {
    let mut films = Vec::new();
    let mut seen = HashSet::new();
    let mut from = 0;

    while let Some(rel) = html[from..].find("c-content-card__title") {
        let start = from + rel;
        let card = &html[start..];
        from = start + "c-content-card__title".len();

        let Some(href_rel) = card.find("href=\"/movies/") else {
            continue;
        };
        let path_start = href_rel + "href=\"".len();
        let Some(path_len) = card[path_start..].find('"') else {
            continue;
        };
        let path = &card[path_start..path_start + path_len];
        let Some(gt) = card[path_start + path_len..].find('>') else {
            continue;
        };
        let text_start = path_start + path_len + gt + 1;
        let Some(text_len) = card[text_start..].find('<') else {
            continue;
        };
        let title = strip_tags(&card[text_start..text_start + text_len]);

        let url = format!("{}{}", base, path);
        if seen.insert(url.clone()) {
            films.push(ListedFilm { title, url });
        }
    }

    films
}

/// Extracts the watch date and display title from a film detail page
fn parse_detail(html: &str) -> Option<WatchRecord> {
    let date = first_time_datetime(html)?;
    let title = og_title(html).unwrap_or_default();
    Some(WatchRecord { date, title })
}

/// Returns the first `<time datetime="...">` value as a UTC timestamp
fn first_time_datetime(html: &str) -> Option<DateTime<Utc>> {
    let pos = html.find("datetime=\"")?;
    let start = pos + "datetime=\"".len();
    let len = html[start..].find('"')?;
    parse_watch_date(&html[start..start + len])
}

/// Accepts the date formats Filmarks renders into `datetime` attributes
///
/// Times on the site are Japan local.
fn parse_watch_date(text: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)
        })?;
    let jst = FixedOffset::east_opt(9 * 3600)?;
    naive
        .and_local_timezone(jst)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Reads the og:title meta content, trimming the site name suffix
fn og_title(html: &str) -> Option<String> {
    let pos = html.find("property=\"og:title\"")?;
    let tag_start = html[..pos].rfind('<')?;
    let tag_end = pos + html[pos..].find('>')?;
    let tag = &html[tag_start..=tag_end];

    let content_pos = tag.find("content=\"")?;
    let value_start = content_pos + "content=\"".len();
    let value_len = tag[value_start..].find('"')?;
    let mut title = tag[value_start..value_start + value_len].to_string();

    for sep in ["｜", "|", " - Filmarks"] {
        if let Some(cut) = title.find(sep) {
            title.truncate(cut);
        }
    }
    let title = title.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}
