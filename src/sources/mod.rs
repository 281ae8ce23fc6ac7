//! Per-platform fetch-and-normalize clients
//!
//! One client per upstream platform, all reducing to `Vec<Post>`. Clients
//! whose items need a second upstream round trip (Booklog, Filmarks, FF14,
//! Tenhou) share [`resolve_with_cache`], which classifies item keys
//! against the dataset cache and batch-fetches only the misses.

pub mod booklog;
pub mod feeds;
pub mod ff14;
pub mod filmarks;
pub mod github;
pub mod spotify;
pub mod tenhou;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{self, CacheStore};
use crate::config::Settings;
use crate::feed::{sort_newest_first, Post};
use crate::fetch::{fetch_batched, FetchPolicy};

use booklog::BooklogClient;
use feeds::{HatenaBlogClient, HatenaBookmarkClient, NoteClient, ZennClient};
use ff14::Ff14Client;
use filmarks::FilmarksClient;
use github::GithubClient;
use spotify::{SpotifyClient, SpotifyCredentials, SpotifyTokenCache};
use tenhou::TenhouClient;

/// Resolves per-item payloads through a dataset cache
///
/// Every key with a still-valid cache entry is served from the cache and
/// generates no upstream call; the remaining keys are fetched through
/// `fetch` in sequential bounded batches. Payloads recovered from misses
/// are written back in a single merged save per invocation. Keys whose
/// fetch failed or timed out are simply absent from the result; callers
/// substitute their dataset default.
pub async fn resolve_with_cache<P, F, Fut>(
    store: &CacheStore,
    dataset: &str,
    policy: &FetchPolicy,
    keys: &[String],
    fetch: F,
) -> HashMap<String, P>
where
    P: Serialize + DeserializeOwned + Clone,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Option<P>>,
{
    let cached = store.load::<P>(dataset);

    let mut resolved = HashMap::new();
    let mut misses = Vec::new();
    for key in keys {
        match cached.get(key) {
            Some(entry) if cache::is_valid(entry.cached_at, policy.ttl_days) => {
                resolved.insert(key.clone(), entry.payload.clone());
            }
            _ => misses.push(key.clone()),
        }
    }
    debug!(
        dataset,
        hits = resolved.len(),
        misses = misses.len(),
        "classified items against cache"
    );

    if misses.is_empty() {
        return resolved;
    }

    let outcomes = fetch_batched(misses.clone(), policy.batch_size, policy.timeout, fetch).await;
    let mut fresh = HashMap::new();
    for (key, outcome) in misses.into_iter().zip(outcomes) {
        if let Some(payload) = outcome {
            fresh.insert(key, payload);
        }
    }

    if !fresh.is_empty() {
        for (key, payload) in &fresh {
            resolved.insert(key.clone(), payload.clone());
        }
        store.save(dataset, fresh);
    }

    resolved
}

/// All configured platform clients behind one façade
///
/// Routes call these methods. A platform with no configured account, or
/// whose upstream fails outright, resolves to an empty list so that one
/// broken source never disturbs the aggregate.
pub struct Sources {
    http: Client,
    store: CacheStore,
    settings: Settings,
    spotify_tokens: Arc<SpotifyTokenCache>,
}

impl Sources {
    pub fn new(http: Client, store: CacheStore, settings: Settings) -> Self {
        Self {
            http,
            store,
            settings,
            spotify_tokens: Arc::new(SpotifyTokenCache::new()),
        }
    }

    /// Policy for the FF14 dataset, which expires daily
    fn achievement_policy(&self) -> FetchPolicy {
        FetchPolicy {
            ttl_days: self.settings.achievement_ttl_days,
            ..self.settings.fetch.clone()
        }
    }

    pub async fn github_posts(&self) -> Vec<Post> {
        let Some(user) = self.settings.accounts.github_user.clone() else {
            return Vec::new();
        };
        absorb(
            "github",
            GithubClient::new(self.http.clone(), user).fetch_posts().await,
        )
    }

    pub async fn hatena_blog_posts(&self) -> Vec<Post> {
        let Some(id) = self.settings.accounts.hatena_id.as_deref() else {
            return Vec::new();
        };
        absorb(
            "hatena-blog",
            HatenaBlogClient::new(self.http.clone(), id).fetch_posts().await,
        )
    }

    pub async fn hatena_bookmark_posts(&self) -> Vec<Post> {
        let Some(id) = self.settings.accounts.hatena_id.as_deref() else {
            return Vec::new();
        };
        absorb(
            "hatena-bookmark",
            HatenaBookmarkClient::new(self.http.clone(), id)
                .fetch_posts()
                .await,
        )
    }

    pub async fn zenn_posts(&self) -> Vec<Post> {
        let Some(user) = self.settings.accounts.zenn_user.as_deref() else {
            return Vec::new();
        };
        absorb(
            "zenn",
            ZennClient::new(self.http.clone(), user).fetch_posts().await,
        )
    }

    pub async fn note_posts(&self) -> Vec<Post> {
        let Some(user) = self.settings.accounts.note_user.as_deref() else {
            return Vec::new();
        };
        absorb(
            "note",
            NoteClient::new(self.http.clone(), user).fetch_posts().await,
        )
    }

    pub async fn booklog_posts(&self) -> Vec<Post> {
        let Some(user) = self.settings.accounts.booklog_user.clone() else {
            return Vec::new();
        };
        let client = BooklogClient::new(
            self.http.clone(),
            user,
            self.store.clone(),
            self.settings.fetch.clone(),
        );
        absorb("booklog", client.fetch_posts().await)
    }

    pub async fn filmarks_posts(&self) -> Vec<Post> {
        let Some(user) = self.settings.accounts.filmarks_user.clone() else {
            return Vec::new();
        };
        let client = FilmarksClient::new(
            self.http.clone(),
            user,
            self.store.clone(),
            self.settings.fetch.clone(),
        );
        absorb("filmarks", client.fetch_posts().await)
    }

    pub async fn spotify_posts(&self) -> Vec<Post> {
        let Some(credentials) = self.spotify_credentials() else {
            return Vec::new();
        };
        let client = SpotifyClient::new(
            self.http.clone(),
            credentials,
            self.spotify_tokens.clone(),
        );
        absorb("spotify", client.fetch_posts().await)
    }

    pub async fn tenhou_posts(&self) -> Vec<Post> {
        let Some(user) = self.settings.accounts.tenhou_user.clone() else {
            return Vec::new();
        };
        let client = TenhouClient::new(
            self.http.clone(),
            user,
            self.store.clone(),
            self.settings.fetch.clone(),
        );
        absorb("tenhou", client.fetch_posts().await)
    }

    pub async fn ff14_posts(&self) -> Vec<Post> {
        let Some(character) = self.settings.accounts.ff14_character.clone() else {
            return Vec::new();
        };
        let client = Ff14Client::new(
            self.http.clone(),
            character,
            self.store.clone(),
            self.achievement_policy(),
        );
        absorb("ff14", client.fetch_posts().await)
    }

    /// Merges every configured platform into one chronological feed
    pub async fn timeline(&self) -> Vec<Post> {
        let (github, hatena_blog, hatena_bookmark, zenn, note, booklog, filmarks, spotify, tenhou, ff14) =
            futures::join!(
                self.github_posts(),
                self.hatena_blog_posts(),
                self.hatena_bookmark_posts(),
                self.zenn_posts(),
                self.note_posts(),
                self.booklog_posts(),
                self.filmarks_posts(),
                self.spotify_posts(),
                self.tenhou_posts(),
                self.ff14_posts()
            );

        let mut posts: Vec<Post> = [
            github,
            hatena_blog,
            hatena_bookmark,
            zenn,
            note,
            booklog,
            filmarks,
            spotify,
            tenhou,
            ff14,
        ]
        .into_iter()
        .flatten()
        .collect();
        sort_newest_first(&mut posts);
        posts
    }

    fn spotify_credentials(&self) -> Option<SpotifyCredentials> {
        let accounts = &self.settings.accounts;
        Some(SpotifyCredentials {
            client_id: accounts.spotify_client_id.clone()?,
            client_secret: accounts.spotify_client_secret.clone()?,
            refresh_token: accounts.spotify_refresh_token.clone()?,
        })
    }
}

/// Collapses a client failure into an empty list, logging it
fn absorb<E: std::fmt::Display>(source: &str, result: Result<Vec<Post>, E>) -> Vec<Post> {
    match result {
        Ok(posts) => posts,
        Err(err) => {
            warn!(source, error = %err, "upstream fetch failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct ReadingStatus {
        status: String,
    }

    fn status(text: &str) -> ReadingStatus {
        ReadingStatus {
            status: text.to_string(),
        }
    }

    fn seeded_store(entries: &[(&str, &str, i64)]) -> (CacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir");
        let mut seeded = HashMap::new();
        for (key, text, age_days) in entries {
            seeded.insert(
                key.to_string(),
                CacheEntry {
                    payload: status(text),
                    cached_at: Utc::now() - Duration::days(*age_days),
                },
            );
        }
        let json = serde_json::to_string_pretty(&seeded).expect("serialize seed");
        std::fs::write(temp_dir.path().join("booklog-cache.json"), json).expect("write seed");
        (CacheStore::with_dir(temp_dir.path().to_path_buf()), temp_dir)
    }

    #[tokio::test]
    async fn test_valid_hit_skips_fetch_and_miss_is_fetched_and_merged() {
        // 25-day-old entry is still valid under the default 30-day TTL
        let (store, _temp_dir) = seeded_store(&[("https://x/1", "読み終わった", 25)]);
        let policy = FetchPolicy::default();
        let keys = vec!["https://x/1".to_string(), "https://x/2".to_string()];

        let fetched = Arc::new(Mutex::new(Vec::new()));
        let log = fetched.clone();
        let resolved = resolve_with_cache(&store, "booklog", &policy, &keys, move |key| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(key);
                Some(status("読みたい"))
            }
        })
        .await;

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved["https://x/1"], status("読み終わった"));
        assert_eq!(resolved["https://x/2"], status("読みたい"));
        assert_eq!(
            *fetched.lock().unwrap(),
            vec!["https://x/2".to_string()],
            "only the miss generates an upstream call"
        );

        // the saved file now carries both keys, old stamp untouched
        let after = store.load::<ReadingStatus>("booklog");
        assert_eq!(after.len(), 2);
        assert!(
            Utc::now() - after["https://x/1"].cached_at > Duration::days(24),
            "hit entry was not rewritten"
        );
    }

    #[tokio::test]
    async fn test_expired_entry_counts_as_miss() {
        let (store, _temp_dir) = seeded_store(&[("https://x/1", "読み終わった", 31)]);
        let policy = FetchPolicy::default();
        let keys = vec!["https://x/1".to_string()];

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let resolved = resolve_with_cache(&store, "booklog", &policy, &keys, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Some(status("いま読んでる"))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolved["https://x/1"], status("いま読んでる"));

        // refreshed entry got a new stamp
        let after = store.load::<ReadingStatus>("booklog");
        assert!(Utc::now() - after["https://x/1"].cached_at < Duration::days(1));
    }

    #[tokio::test]
    async fn test_all_hits_generate_zero_fetches() {
        let (store, _temp_dir) =
            seeded_store(&[("https://x/1", "積読", 1), ("https://x/2", "読みたい", 2)]);
        let policy = FetchPolicy::default();
        let keys = vec!["https://x/1".to_string(), "https://x/2".to_string()];

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let resolved = resolve_with_cache(&store, "booklog", &policy, &keys, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Some(status("x"))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolved.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_absent_and_not_saved() {
        let temp_dir = TempDir::new().expect("temp dir");
        let store = CacheStore::with_dir(temp_dir.path().to_path_buf());
        let policy = FetchPolicy::default();
        let keys = vec!["https://x/1".to_string(), "https://x/2".to_string()];

        let resolved = resolve_with_cache(&store, "booklog", &policy, &keys, |key| async move {
            if key.ends_with("/1") {
                Some(status("読み終わった"))
            } else {
                None
            }
        })
        .await;

        assert_eq!(resolved.len(), 1);
        assert!(!resolved.contains_key("https://x/2"));

        let after = store.load::<ReadingStatus>("booklog");
        assert_eq!(after.len(), 1, "failed item must not be cached");
    }

    #[tokio::test]
    async fn test_unconfigured_sources_resolve_to_empty_lists() {
        let temp_dir = TempDir::new().expect("temp dir");
        let sources = Sources::new(
            Client::new(),
            CacheStore::with_dir(temp_dir.path().to_path_buf()),
            Settings::default(),
        );

        assert!(sources.github_posts().await.is_empty());
        assert!(sources.booklog_posts().await.is_empty());
        assert!(sources.spotify_posts().await.is_empty());
        assert!(sources.timeline().await.is_empty());
    }
}
