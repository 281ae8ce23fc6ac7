//! Lifestream - personal activity feed aggregator
//!
//! Serves one person's activity across third-party platforms (GitHub,
//! Hatena, Zenn, Note, Booklog, Filmarks, Spotify, Tenhou, FF14
//! Lodestone) as normalized JSON feeds plus one merged timeline.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lifestream::cache::CacheStore;
use lifestream::config::{Cli, Settings};
use lifestream::server::{self, rate_limit::RateLimiter, AppState};
use lifestream::sources::Sources;

/// How often the limiter sweep drops lapsed client buckets
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Installs the global tracing subscriber
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lifestream=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::from_cli(&cli);

    let store = match &settings.data_dir {
        Some(dir) => CacheStore::with_dir(dir.clone()),
        None => CacheStore::new()
            .unwrap_or_else(|| CacheStore::with_dir(std::env::temp_dir().join("lifestream"))),
    };

    let http = reqwest::Client::builder()
        .user_agent(concat!("lifestream/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let limiter = Arc::new(RateLimiter::new(settings.rate_window, settings.rate_limit));
    let sources = Arc::new(Sources::new(http, store, settings.clone()));
    let state = AppState {
        sources,
        limiter: limiter.clone(),
    };

    let _sweeper = server::spawn_limiter_sweeper(limiter, SWEEP_INTERVAL);

    let app = server::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.bind).await?;
    info!(addr = %settings.bind, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
