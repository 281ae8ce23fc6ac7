//! Fixed-window request limiting
//!
//! Each client identifier gets a counter that resets when its window
//! elapses. State is process-local; a multi-instance deployment would
//! swap this for a shared store, which is why the limiter is injected
//! into the router rather than living in a module global.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Outcome of a single rate limit check
#[derive(Debug, Clone)]
pub struct RateDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window after this one
    pub remaining: u32,
    /// When the current window ends and the counter resets
    pub reset: DateTime<Utc>,
}

#[derive(Debug)]
struct Bucket {
    window_start: DateTime<Utc>,
    count: u32,
}

/// Fixed-window request limiter keyed by client identifier
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(window: std::time::Duration, max_requests: u32) -> Self {
        Self {
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::hours(1)),
            max_requests,
            buckets: DashMap::new(),
        }
    }

    /// Checks and counts one request for the given identifier
    ///
    /// A fresh identifier opens a window starting now. A rejected request
    /// does not extend or reset the window.
    pub fn check(&self, identifier: &str) -> RateDecision {
        let now = Utc::now();
        let mut bucket = self
            .buckets
            .entry(identifier.to_string())
            .or_insert_with(|| Bucket {
                window_start: now,
                count: 0,
            });

        if now - bucket.window_start >= self.window {
            bucket.window_start = now;
            bucket.count = 0;
        }

        let reset = bucket.window_start + self.window;
        if bucket.count >= self.max_requests {
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset,
            };
        }

        bucket.count += 1;
        RateDecision {
            allowed: true,
            remaining: self.max_requests - bucket.count,
            reset,
        }
    }

    /// The configured per-window request budget
    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    /// Drops identifiers whose window has fully elapsed
    ///
    /// Run periodically so one-off clients do not accumulate forever.
    pub fn sweep(&self) {
        let now = Utc::now();
        self.buckets
            .retain(|_, bucket| now - bucket.window_start < self.window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn test_requests_within_budget_are_allowed() {
        let limiter = RateLimiter::new(StdDuration::from_secs(3600), 60);

        for expected_remaining in (0..60).rev() {
            let decision = limiter.check("alice");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }
    }

    #[test]
    fn test_61st_request_in_window_is_rejected() {
        let limiter = RateLimiter::new(StdDuration::from_secs(3600), 60);

        for _ in 0..60 {
            assert!(limiter.check("alice").allowed);
        }
        let rejected = limiter.check("alice");
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
    }

    #[test]
    fn test_identifiers_are_limited_independently() {
        let limiter = RateLimiter::new(StdDuration::from_secs(3600), 2);

        assert!(limiter.check("alice").allowed);
        assert!(limiter.check("alice").allowed);
        assert!(!limiter.check("alice").allowed);
        // a different identifier in the same window is unaffected
        assert!(limiter.check("bob").allowed);
    }

    #[test]
    fn test_reset_reports_window_end() {
        let limiter = RateLimiter::new(StdDuration::from_secs(3600), 60);
        let before = Utc::now();
        let decision = limiter.check("alice");

        let elapsed_to_reset = decision.reset - before;
        assert!(elapsed_to_reset <= Duration::seconds(3601));
        assert!(elapsed_to_reset >= Duration::seconds(3599));
    }

    #[test]
    fn test_window_elapse_resets_the_counter() {
        let limiter = RateLimiter::new(StdDuration::from_millis(20), 1);

        assert!(limiter.check("alice").allowed);
        assert!(!limiter.check("alice").allowed);

        std::thread::sleep(StdDuration::from_millis(30));
        assert!(limiter.check("alice").allowed, "new window, fresh budget");
    }

    #[test]
    fn test_sweep_drops_lapsed_identifiers_only() {
        let limiter = RateLimiter::new(StdDuration::from_millis(20), 60);

        limiter.check("stale");
        std::thread::sleep(StdDuration::from_millis(30));
        limiter.check("active");
        limiter.sweep();

        assert!(!limiter.buckets.contains_key("stale"));
        assert!(limiter.buckets.contains_key("active"));
    }
}
