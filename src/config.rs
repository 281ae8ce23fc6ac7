//! Command-line and environment configuration
//!
//! Every tuning knob (TTLs, batch size, timeouts, rate limits) and every
//! platform account handle arrives through clap, with `LIFESTREAM_*`
//! environment fallbacks. Parsed arguments resolve into a plain
//! `Settings` struct that the rest of the application consumes.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::fetch::FetchPolicy;

/// Lifestream - personal activity feed aggregator
#[derive(Parser, Debug, Clone)]
#[command(name = "lifestream")]
#[command(about = "Aggregates personal activity from third-party platforms into a JSON API")]
#[command(version)]
pub struct Cli {
    /// Address to bind the HTTP server to
    #[arg(long, env = "LIFESTREAM_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Directory for per-dataset cache files (platform cache dir when unset)
    #[arg(long, env = "LIFESTREAM_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Days a cached item payload stays valid
    #[arg(long, env = "LIFESTREAM_CACHE_TTL_DAYS", default_value_t = 30)]
    pub cache_ttl_days: i64,

    /// Days a cached FF14 achievement stays valid
    #[arg(long, env = "LIFESTREAM_ACHIEVEMENT_TTL_DAYS", default_value_t = 1)]
    pub achievement_ttl_days: i64,

    /// Items fetched concurrently per batch
    #[arg(long, env = "LIFESTREAM_BATCH_SIZE", default_value_t = 5)]
    pub batch_size: usize,

    /// Per-item fetch timeout in seconds
    #[arg(long, env = "LIFESTREAM_FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Requests allowed per rate-limit window per client
    #[arg(long, env = "LIFESTREAM_RATE_LIMIT", default_value_t = 60)]
    pub rate_limit: u32,

    /// Rate-limit window length in seconds
    #[arg(long, env = "LIFESTREAM_RATE_WINDOW_SECS", default_value_t = 3600)]
    pub rate_window_secs: u64,

    /// GitHub account whose public activity is aggregated
    #[arg(long, env = "LIFESTREAM_GITHUB_USER")]
    pub github_user: Option<String>,

    /// Hatena ID, used for both the blog and the bookmark feed
    #[arg(long, env = "LIFESTREAM_HATENA_ID")]
    pub hatena_id: Option<String>,

    /// Zenn account
    #[arg(long, env = "LIFESTREAM_ZENN_USER")]
    pub zenn_user: Option<String>,

    /// Note account
    #[arg(long, env = "LIFESTREAM_NOTE_USER")]
    pub note_user: Option<String>,

    /// Booklog account
    #[arg(long, env = "LIFESTREAM_BOOKLOG_USER")]
    pub booklog_user: Option<String>,

    /// Filmarks account
    #[arg(long, env = "LIFESTREAM_FILMARKS_USER")]
    pub filmarks_user: Option<String>,

    /// Tenhou player name
    #[arg(long, env = "LIFESTREAM_TENHOU_USER")]
    pub tenhou_user: Option<String>,

    /// FF14 Lodestone character ID
    #[arg(long, env = "LIFESTREAM_FF14_CHARACTER")]
    pub ff14_character: Option<String>,

    /// Spotify application client ID
    #[arg(long, env = "LIFESTREAM_SPOTIFY_CLIENT_ID")]
    pub spotify_client_id: Option<String>,

    /// Spotify application client secret
    #[arg(long, env = "LIFESTREAM_SPOTIFY_CLIENT_SECRET")]
    pub spotify_client_secret: Option<String>,

    /// Spotify OAuth refresh token
    #[arg(long, env = "LIFESTREAM_SPOTIFY_REFRESH_TOKEN")]
    pub spotify_refresh_token: Option<String>,
}

/// Resolved application settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Address the HTTP server binds to
    pub bind: SocketAddr,
    /// Cache file directory override
    pub data_dir: Option<PathBuf>,
    /// Batch size, per-item timeout and default TTL for detail fetches
    pub fetch: FetchPolicy,
    /// TTL for the FF14 achievements dataset
    pub achievement_ttl_days: i64,
    /// Requests allowed per window per client identifier
    pub rate_limit: u32,
    /// Length of the rate-limit window
    pub rate_window: Duration,
    /// Configured platform accounts; unset platforms serve empty feeds
    pub accounts: Accounts,
}

/// Per-platform account handles and credentials
#[derive(Debug, Clone, Default)]
pub struct Accounts {
    pub github_user: Option<String>,
    pub hatena_id: Option<String>,
    pub zenn_user: Option<String>,
    pub note_user: Option<String>,
    pub booklog_user: Option<String>,
    pub filmarks_user: Option<String>,
    pub tenhou_user: Option<String>,
    pub ff14_character: Option<String>,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub spotify_refresh_token: Option<String>,
}

impl Settings {
    /// Resolves settings from parsed CLI arguments
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            bind: cli.bind,
            data_dir: cli.data_dir.clone(),
            fetch: FetchPolicy {
                batch_size: cli.batch_size,
                timeout: Duration::from_secs(cli.fetch_timeout_secs),
                ttl_days: cli.cache_ttl_days,
            },
            achievement_ttl_days: cli.achievement_ttl_days,
            rate_limit: cli.rate_limit,
            rate_window: Duration::from_secs(cli.rate_window_secs),
            accounts: Accounts {
                github_user: cli.github_user.clone(),
                hatena_id: cli.hatena_id.clone(),
                zenn_user: cli.zenn_user.clone(),
                note_user: cli.note_user.clone(),
                booklog_user: cli.booklog_user.clone(),
                filmarks_user: cli.filmarks_user.clone(),
                tenhou_user: cli.tenhou_user.clone(),
                ff14_character: cli.ff14_character.clone(),
                spotify_client_id: cli.spotify_client_id.clone(),
                spotify_client_secret: cli.spotify_client_secret.clone(),
                spotify_refresh_token: cli.spotify_refresh_token.clone(),
            },
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_dir: None,
            fetch: FetchPolicy::default(),
            achievement_ttl_days: 1,
            rate_limit: 60,
            rate_window: Duration::from_secs(3600),
            accounts: Accounts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["lifestream"]);
        assert_eq!(cli.bind, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(cli.cache_ttl_days, 30);
        assert_eq!(cli.achievement_ttl_days, 1);
        assert_eq!(cli.batch_size, 5);
        assert_eq!(cli.fetch_timeout_secs, 10);
        assert_eq!(cli.rate_limit, 60);
        assert_eq!(cli.rate_window_secs, 3600);
        assert!(cli.github_user.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "lifestream",
            "--bind",
            "0.0.0.0:3000",
            "--batch-size",
            "8",
            "--cache-ttl-days",
            "7",
            "--github-user",
            "someone",
        ]);
        assert_eq!(cli.bind, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(cli.batch_size, 8);
        assert_eq!(cli.cache_ttl_days, 7);
        assert_eq!(cli.github_user.as_deref(), Some("someone"));
    }

    #[test]
    fn test_settings_from_cli_resolves_durations_and_policy() {
        let cli = Cli::parse_from([
            "lifestream",
            "--fetch-timeout-secs",
            "15",
            "--rate-window-secs",
            "60",
            "--hatena-id",
            "someone",
        ]);
        let settings = Settings::from_cli(&cli);

        assert_eq!(settings.fetch.timeout, Duration::from_secs(15));
        assert_eq!(settings.fetch.batch_size, 5);
        assert_eq!(settings.rate_window, Duration::from_secs(60));
        assert_eq!(settings.accounts.hatena_id.as_deref(), Some("someone"));
        assert!(settings.accounts.spotify_client_id.is_none());
    }
}
