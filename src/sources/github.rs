//! GitHub public activity client
//!
//! Normalizes the public events API into posts. Only event kinds that make
//! sense on a timeline are surfaced; the rest are dropped silently.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::feed::{sort_newest_first, Post, Source};

/// Base URL for the GitHub REST API
const GITHUB_API_BASE: &str = "https://api.github.com";

/// Events requested per listing call
const EVENTS_PER_PAGE: u32 = 30;

/// Errors that can occur when fetching GitHub activity
#[derive(Debug, Error)]
pub enum GithubError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// A single event from the public events API
#[derive(Debug, Deserialize)]
struct GithubEvent {
    #[serde(rename = "type")]
    kind: String,
    repo: GithubRepo,
    created_at: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GithubRepo {
    name: String,
}

/// Client for a user's public GitHub activity
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: Client,
    user: String,
}

impl GithubClient {
    pub fn new(http: Client, user: impl Into<String>) -> Self {
        Self {
            http,
            user: user.into(),
        }
    }

    /// Fetches the user's recent public events and normalizes them
    pub async fn fetch_posts(&self) -> Result<Vec<Post>, GithubError> {
        let url = format!(
            "{}/users/{}/events/public?per_page={}",
            GITHUB_API_BASE, self.user, EVENTS_PER_PAGE
        );
        let events = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<GithubEvent>>()
            .await?;
        Ok(normalize_events(events))
    }
}

fn normalize_events(events: Vec<GithubEvent>) -> Vec<Post> {
    let mut posts: Vec<Post> = events.iter().filter_map(event_to_post).collect();
    sort_newest_first(&mut posts);
    posts
}

/// Maps one raw event to a post; unknown kinds and bad dates drop the event
fn event_to_post(event: &GithubEvent) -> Option<Post> {
    let date = DateTime::parse_from_rfc3339(&event.created_at)
        .ok()?
        .with_timezone(&Utc);
    let repo = &event.repo.name;
    let repo_url = format!("https://github.com/{}", repo);

    let (title, url, description) = match event.kind.as_str() {
        "PushEvent" => {
            let description = event.payload["commits"]
                .as_array()
                .map(|commits| {
                    commits
                        .iter()
                        .filter_map(|commit| commit["message"].as_str())
                        .take(3)
                        .collect::<Vec<_>>()
                        .join(" / ")
                })
                .unwrap_or_default();
            (format!("{} にプッシュしました", repo), repo_url, description)
        }
        "PullRequestEvent" => {
            let url = event.payload["pull_request"]["html_url"]
                .as_str()
                .map(str::to_string)
                .unwrap_or(repo_url);
            let pr_title = event.payload["pull_request"]["title"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            (format!("{} にプルリクエスト", repo), url, pr_title)
        }
        "IssuesEvent" => {
            let url = event.payload["issue"]["html_url"]
                .as_str()
                .map(str::to_string)
                .unwrap_or(repo_url);
            let issue_title = event.payload["issue"]["title"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            (format!("{} のIssueを更新しました", repo), url, issue_title)
        }
        "CreateEvent" => (
            format!("{} を作成しました", repo),
            repo_url,
            String::new(),
        ),
        "ForkEvent" => {
            let url = event.payload["forkee"]["html_url"]
                .as_str()
                .map(str::to_string)
                .unwrap_or(repo_url);
            (format!("{} をフォークしました", repo), url, String::new())
        }
        "WatchEvent" => (
            format!("{} にスターを付けました", repo),
            repo_url,
            String::new(),
        ),
        _ => return None,
    };

    Some(Post {
        title,
        url,
        date,
        description,
        thumbnail: None,
        source: Source::Github,
    })
}
