//! Tenhou game log client
//!
//! The log search page lists a player's recent games; each game's raw JSON
//! log carries the seat names and final scores, from which the player's
//! placement is derived and memoized in the `tenhou` cache dataset.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::cache::CacheStore;
use crate::feed::{sort_newest_first, Post, Source};
use crate::fetch::FetchPolicy;
use crate::sources::resolve_with_cache;

/// Base URL of the Tenhou service
const TENHOU_BASE: &str = "https://tenhou.net";

/// Cache dataset holding per-game results
const DATASET: &str = "tenhou";

/// Errors that can occur when fetching the game list
#[derive(Debug, Error)]
pub enum TenhouError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// Cached per-game payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    /// Final placement, 1 through 4
    pub rank: u32,
    /// Final score in points
    pub score: i32,
    /// When the game started
    pub date: DateTime<Utc>,
}

/// Client for a player's Tenhou game history
pub struct TenhouClient {
    http: Client,
    user: String,
    store: CacheStore,
    policy: FetchPolicy,
}

impl TenhouClient {
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

    /// Fetches the game list and resolves per-game results
    pub async fn fetch_posts(&self) -> Result<Vec<Post>, TenhouError> {
        let url = format!("{}/0/log/find.cgi", TENHOU_BASE);
        let page = self
            .http
            .get(&url)
            .query(&[("un", self.user.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let keys: Vec<String> = parse_log_ids(&page)
            .into_iter()
            .map(|id| format!("{}/0/?log={}", TENHOU_BASE, id))
            .collect();

        let http = self.http.clone();
        let user = self.user.clone();
        let results = resolve_with_cache(&self.store, DATASET, &self.policy, &keys, move |url| {
            let http = http.clone();
            let user = user.clone();
            async move {
                let id = url.split("?log=").nth(1)?.to_string();
                let log_url = format!("{}/0/log/?{}", TENHOU_BASE, id);
                let body = match fetch_text(&http, &log_url).await {
                    Ok(body) => body,
                    Err(err) => {
                        warn!(url = log_url, error = %err, "tenhou log fetch failed");
                        return None;
                    }
                };
                parse_game_log(&body, &user)
            }
        })
        .await;

        let mut posts: Vec<Post> = keys
            .into_iter()
            .map(|key| {
                let result = results.get(&key).cloned();
                Post {
                    title: result
                        .as_ref()
                        .map(|r| format!("天鳳 {}位 ({}点)", r.rank, r.score))
                        .unwrap_or_else(|| "天鳳で対局".to_string()),
                    date: result
                        .as_ref()
                        .map(|r| r.date)
                        .unwrap_or(DateTime::UNIX_EPOCH),
                    description: String::new(),
                    thumbnail: None,
                    url: key,
                    source: Source::Tenhou,
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

/// Collects game log IDs from the search page markup
fn parse_log_ids(html: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    let mut from = 0;

    while let Some(rel) = html[from..].find("log=") {
        let start = from + rel + "log=".len();
        from = start;
        let id: String = html[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        if id.len() >= 8 && seen.insert(id.clone()) {
            ids.push(id);
        }
    }

    ids
}

/// Derives the player's placement from a raw game log
///
/// The log's `sc` array interleaves final scores (in hundreds) with uma;
/// placement counts players with a higher score, ties broken by seat
/// order.
fn parse_game_log(body: &str, user: &str) -> Option<GameResult> {
    let log: serde_json::Value = serde_json::from_str(body).ok()?;

    let names = log["name"].as_array()?;
    let seat = names.iter().position(|name| name.as_str() == Some(user))?;

    let sc = log["sc"].as_array()?;
    let mut finals = Vec::with_capacity(names.len());
    for i in 0..names.len() {
        finals.push(sc.get(2 * i)?.as_f64()?);
    }
    let mine = finals[seat];
    let rank = 1 + finals
        .iter()
        .enumerate()
        .filter(|(i, score)| **score > mine || (**score == mine && *i < seat))
        .count() as u32;
    let score = (mine * 100.0).round() as i32;

    let date_text = log["title"].as_array()?.get(1)?.as_str()?;
    let date = parse_start_time(date_text)?;

    Some(GameResult { rank, score, date })
}

/// Parses the game start time, which Tenhou renders in Japan time
fn parse_start_time(text: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(text, "%Y/%m/%d %H:%M")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y/%m/%d")
                .ok()?
                .and_hms_opt(0, 0, 0)
        })?;
    let jst = FixedOffset::east_opt(9 * 3600)?;
    naive
        .and_local_timezone(jst)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
