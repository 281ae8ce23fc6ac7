//! RSS/Atom-backed platform clients
//!
//! Hatena Blog, Hatena Bookmark, Zenn and Note all publish standard
//! syndication feeds, so their clients share one fetch path and differ
//! only in feed URL and source tag.

use reqwest::Client;
use thiserror::Error;

use crate::feed::rss::{parse_feed, FeedItem};
use crate::feed::{sort_newest_first, strip_tags, Post, Source};

/// Errors that can occur when fetching a syndication feed
#[derive(Debug, Error)]
pub enum FeedError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// Fetches a feed document and normalizes its items
async fn fetch_feed_posts(
    http: &Client,
    url: &str,
    source: Source,
) -> Result<Vec<Post>, FeedError> {
    let body = http.get(url).send().await?.error_for_status()?.text().await?;
    let mut posts: Vec<Post> = parse_feed(&body)
        .into_iter()
        .map(|item| item_to_post(item, source))
        .collect();
    sort_newest_first(&mut posts);
    Ok(posts)
}

fn item_to_post(item: FeedItem, source: Source) -> Post {
    Post {
        title: item.title,
        url: item.link,
        date: item.date,
        description: strip_tags(&item.description),
        thumbnail: item.thumbnail,
        source,
    }
}

/// Client for a Hatena Blog RSS feed
#[derive(Debug, Clone)]
pub struct HatenaBlogClient {
    http: Client,
    feed_url: String,
}

impl HatenaBlogClient {
    pub fn new(http: Client, hatena_id: &str) -> Self {
        Self {
            feed_url: format!("https://{}.hatenablog.com/rss", hatena_id),
            http,
        }
    }

    /// Fetches the latest blog entries
    pub async fn fetch_posts(&self) -> Result<Vec<Post>, FeedError> {
        fetch_feed_posts(&self.http, &self.feed_url, Source::HatenaBlog).await
    }
}

/// Client for a Hatena Bookmark RSS (RDF) feed
#[derive(Debug, Clone)]
pub struct HatenaBookmarkClient {
    http: Client,
    feed_url: String,
}

impl HatenaBookmarkClient {
    pub fn new(http: Client, hatena_id: &str) -> Self {
        Self {
            feed_url: format!("https://b.hatena.ne.jp/{}/rss", hatena_id),
            http,
        }
    }

    /// Fetches the latest bookmarks; the description carries the comment
    pub async fn fetch_posts(&self) -> Result<Vec<Post>, FeedError> {
        fetch_feed_posts(&self.http, &self.feed_url, Source::HatenaBookmark).await
    }
}

/// Client for a Zenn article feed
#[derive(Debug, Clone)]
pub struct ZennClient {
    http: Client,
    feed_url: String,
}

impl ZennClient {
    pub fn new(http: Client, user: &str) -> Self {
        Self {
            feed_url: format!("https://zenn.dev/{}/feed", user),
            http,
        }
    }

    /// Fetches the latest articles
    pub async fn fetch_posts(&self) -> Result<Vec<Post>, FeedError> {
        fetch_feed_posts(&self.http, &self.feed_url, Source::Zenn).await
    }
}

/// Client for a Note RSS feed
#[derive(Debug, Clone)]
pub struct NoteClient {
    http: Client,
    feed_url: String,
}

impl NoteClient {
    pub fn new(http: Client, user: &str) -> Self {
        Self {
            feed_url: format!("https://note.com/{}/rss", user),
            http,
        }
    }

    /// Fetches the latest notes
    pub async fn fetch_posts(&self) -> Result<Vec<Post>, FeedError> {
        fetch_feed_posts(&self.http, &self.feed_url, Source::Note).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_item_to_post_strips_markup_from_description() {
        let item = FeedItem {
            title: "記事".to_string(),
            link: "https://blog.example.com/entry/1".to_string(),
            date: Utc.with_ymd_and_hms(2025, 1, 10, 3, 0, 0).unwrap(),
            description: "<p>本文の <b>抜粋</b></p>".to_string(),
            thumbnail: Some("https://cdn.example.com/1.png".to_string()),
        };

        let post = item_to_post(item, Source::HatenaBlog);

        assert_eq!(post.description, "本文の 抜粋");
        assert_eq!(
            post.thumbnail,
            Some("https://cdn.example.com/1.png".to_string())
        );
        assert_eq!(post.source, Source::HatenaBlog);
        assert_eq!(post.url, "https://blog.example.com/entry/1");
    }

    #[test]
    fn test_feed_urls_are_derived_from_account_handles() {
        let http = Client::new();
        assert_eq!(
            HatenaBlogClient::new(http.clone(), "someone").feed_url,
            "https://someone.hatenablog.com/rss"
        );
        assert_eq!(
            HatenaBookmarkClient::new(http.clone(), "someone").feed_url,
            "https://b.hatena.ne.jp/someone/rss"
        );
        assert_eq!(
            ZennClient::new(http.clone(), "someone").feed_url,
            "https://zenn.dev/someone/feed"
        );
        assert_eq!(
            NoteClient::new(http, "someone").feed_url,
            "https://note.com/someone/rss"
        );
    }
}
