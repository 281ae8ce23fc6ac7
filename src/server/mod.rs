//! HTTP surface
//!
//! One GET route per platform plus the merged timeline, each returning a
//! JSON array of posts. Every `/api` route passes through the fixed-window
//! rate limiter; responses carry the `X-RateLimit-*` headers and an
//! exhausted budget is the only condition that produces a non-200 status.

pub mod rate_limit;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::USER_AGENT;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::SecondsFormat;
use tokio::task::JoinHandle;

use crate::feed::Post;
use crate::sources::Sources;
use rate_limit::{RateDecision, RateLimiter};

static RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
static RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
static RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Shared state behind every route
#[derive(Clone)]
pub struct AppState {
    pub sources: Arc<Sources>,
    pub limiter: Arc<RateLimiter>,
}

/// Builds the application router
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/github", get(github))
        .route("/api/hatena-blog", get(hatena_blog))
        .route("/api/hatena-bookmark", get(hatena_bookmark))
        .route("/api/zenn", get(zenn))
        .route("/api/note", get(note))
        .route("/api/booklog", get(booklog))
        .route("/api/filmarks", get(filmarks))
        .route("/api/spotify", get(spotify))
        .route("/api/tenhou", get(tenhou))
        .route("/api/ff14", get(ff14))
        .route("/api/timeline", get(timeline))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_layer,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .with_state(state)
}

/// Spawns the periodic sweep that drops lapsed limiter buckets
pub fn spawn_limiter_sweeper(
    limiter: Arc<RateLimiter>,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // Skip the first tick (immediate)
        interval.tick().await;
        loop {
            interval.tick().await;
            limiter.sweep();
        }
    })
}

async fn health() -> &'static str {
    "ok"
}

async fn github(State(state): State<AppState>) -> Json<Vec<Post>> {
    Json(state.sources.github_posts().await)
}

async fn hatena_blog(State(state): State<AppState>) -> Json<Vec<Post>> {
    Json(state.sources.hatena_blog_posts().await)
}

async fn hatena_bookmark(State(state): State<AppState>) -> Json<Vec<Post>> {
    Json(state.sources.hatena_bookmark_posts().await)
}

async fn zenn(State(state): State<AppState>) -> Json<Vec<Post>> {
    Json(state.sources.zenn_posts().await)
}

async fn note(State(state): State<AppState>) -> Json<Vec<Post>> {
    Json(state.sources.note_posts().await)
}

async fn booklog(State(state): State<AppState>) -> Json<Vec<Post>> {
    Json(state.sources.booklog_posts().await)
}

async fn filmarks(State(state): State<AppState>) -> Json<Vec<Post>> {
    Json(state.sources.filmarks_posts().await)
}

async fn spotify(State(state): State<AppState>) -> Json<Vec<Post>> {
    Json(state.sources.spotify_posts().await)
}

async fn tenhou(State(state): State<AppState>) -> Json<Vec<Post>> {
    Json(state.sources.tenhou_posts().await)
}

async fn ff14(State(state): State<AppState>) -> Json<Vec<Post>> {
    Json(state.sources.ff14_posts().await)
}

async fn timeline(State(state): State<AppState>) -> Json<Vec<Post>> {
    Json(state.sources.timeline().await)
}

/// Applies the fixed-window rate limit and stamps the quota headers
async fn rate_limit_layer(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let identifier = client_identifier(&request);
    let decision = state.limiter.check(&identifier);

    if !decision.allowed {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": "rate limit exceeded" })),
        )
            .into_response();
        apply_rate_headers(&mut response, state.limiter.limit(), &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_rate_headers(&mut response, state.limiter.limit(), &decision);
    response
}

/// Derives the limiter key for a request
///
/// Prefers the first `X-Forwarded-For` hop, falling back to the socket
/// peer address, and appends the user agent.
fn client_identifier(request: &Request<Body>) -> String {
    let ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    let agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    format!("{}|{}", ip, agent)
}

fn apply_rate_headers(response: &mut Response, limit: u32, decision: &RateDecision) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert(RATE_LIMIT_LIMIT.clone(), value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert(RATE_LIMIT_REMAINING.clone(), value);
    }
    let reset = decision.reset.to_rfc3339_opts(SecondsFormat::Secs, true);
    if let Ok(value) = HeaderValue::from_str(&reset) {
        headers.insert(RATE_LIMIT_RESET.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn request_with(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = HttpRequest::builder().uri("/api/timeline");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).expect("request builds")
    }

    #[test]
    fn test_client_identifier_prefers_forwarded_for_first_hop() {
        let request = request_with(&[
            ("x-forwarded-for", "203.0.113.9, 10.0.0.1"),
            ("user-agent", "feedreader/1.0"),
        ]);
        assert_eq!(client_identifier(&request), "203.0.113.9|feedreader/1.0");
    }

    #[test]
    fn test_client_identifier_without_any_origin_info() {
        let request = request_with(&[]);
        assert_eq!(client_identifier(&request), "unknown|");
    }

    #[test]
    fn test_client_identifier_uses_connect_info_when_present() {
        let mut request = request_with(&[("user-agent", "curl/8.0")]);
        let addr: SocketAddr = "198.51.100.7:44210".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_identifier(&request), "198.51.100.7|curl/8.0");
    }
}
