//! Spotify recently-played client
//!
//! Uses the OAuth refresh-token flow. The short-lived bearer token is
//! memoized in an injectable in-memory cache and only re-fetched once its
//! remaining lifetime drops below the slack.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::feed::{force_https, sort_newest_first, Post, Source};

/// OAuth token endpoint
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Recently-played endpoint
const RECENTLY_PLAYED_URL: &str =
    "https://api.spotify.com/v1/me/player/recently-played?limit=20";

/// Seconds subtracted from a token's lifetime before it counts as stale
const EXPIRY_SLACK_SECS: i64 = 60;

/// Errors that can occur when fetching Spotify activity
#[derive(Debug, Error)]
pub enum SpotifyError {
    /// HTTP request failed (covers both the token and the player endpoint)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// OAuth application credentials plus the user's long-lived refresh token
#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Injectable in-memory store for the short-lived bearer token
///
/// Lives on the application state rather than in a module global, so
/// tests can reset it and a multi-instance deployment can swap it for a
/// shared store. A lost race between two concurrent refreshes costs one
/// duplicate token request; both writers store an equally valid token.
#[derive(Debug, Default)]
pub struct SpotifyTokenCache {
    inner: Mutex<Option<CachedToken>>,
}

impl SpotifyTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached token while it is still comfortably valid
    fn fresh_token(&self) -> Option<String> {
        let guard = self.inner.lock().ok()?;
        guard
            .as_ref()
            .filter(|token| token.expires_at > Utc::now())
            .map(|token| token.access_token.clone())
    }

    /// Stores a token, discounting its lifetime by the expiry slack
    fn store(&self, access_token: String, expires_in_secs: i64) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(CachedToken {
                access_token,
                expires_at: Utc::now() + Duration::seconds(expires_in_secs - EXPIRY_SLACK_SECS),
            });
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct RecentlyPlayed {
    #[serde(default)]
    items: Vec<PlayedItem>,
}

#[derive(Debug, Deserialize)]
struct PlayedItem {
    track: Track,
    played_at: String,
}

#[derive(Debug, Deserialize)]
struct Track {
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
    #[serde(default)]
    external_urls: ExternalUrls,
    #[serde(default)]
    album: Album,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: String,
}

#[derive(Debug, Default, Deserialize)]
struct Album {
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

/// Client for the user's listening history
pub struct SpotifyClient {
    http: Client,
    credentials: SpotifyCredentials,
    tokens: Arc<SpotifyTokenCache>,
}

impl SpotifyClient {
    pub fn new(
        http: Client,
        credentials: SpotifyCredentials,
        tokens: Arc<SpotifyTokenCache>,
    ) -> Self {
        Self {
            http,
            credentials,
            tokens,
        }
    }

    /// Fetches recently played tracks and normalizes them
    pub async fn fetch_posts(&self) -> Result<Vec<Post>, SpotifyError> {
        let token = self.bearer_token().await?;
        let played = self
            .http
            .get(RECENTLY_PLAYED_URL)
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?
            .json::<RecentlyPlayed>()
            .await?;
        Ok(normalize_played(played))
    }

    /// Returns a valid bearer token, refreshing through OAuth when stale
    async fn bearer_token(&self) -> Result<String, SpotifyError> {
        if let Some(token) = self.tokens.fresh_token() {
            return Ok(token);
        }

        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<TokenResponse>()
            .await?;

        self.tokens
            .store(response.access_token.clone(), response.expires_in);
        Ok(response.access_token)
    }
}

fn normalize_played(played: RecentlyPlayed) -> Vec<Post> {
    let mut posts: Vec<Post> = played.items.into_iter().filter_map(item_to_post).collect();
    sort_newest_first(&mut posts);
    posts
}

fn item_to_post(item: PlayedItem) -> Option<Post> {
    let date = DateTime::parse_from_rfc3339(&item.played_at)
        .ok()?
        .with_timezone(&Utc);
    let artists = item
        .track
        .artists
        .iter()
        .map(|artist| artist.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let title = if artists.is_empty() {
        item.track.name
    } else {
        format!("{} - {}", item.track.name, artists)
    };
    let thumbnail = item
        .track
        .album
        .images
        .first()
        .map(|image| force_https(&image.url));

    Some(Post {
        title,
        url: item.track.external_urls.spotify,
        date,
        description: String::new(),
        thumbnail,
        source: Source::Spotify,
    })
}
