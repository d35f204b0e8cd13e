//! Fixed-window rate limiting per client identity.
//!
//! # Responsibilities
//! - Count requests per identity inside a fixed window
//! - Short-circuit with 429 once the count exceeds the budget
//! - Advertise the budget with `X-RateLimit-*` headers
//!
//! # Design Decisions
//! - One store per worker, owned by that worker's chain; a client's global
//!   budget is the limit times the number of workers it reaches
//! - A rejected request still counts (no decrement on failure)
//! - Entries reset lazily on the first request after their window

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::http::error::AppError;
use crate::http::request::{ClientIdentity, RequestContext};

/// Store size above which expired entries are swept.
const SWEEP_THRESHOLD: usize = 10_000;

/// Counter for one identity.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub window_start: Instant,
    pub count: u32,
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32, reset_in: Duration },
    Limited { reset_in: Duration },
}

/// Per-worker counter table.
pub struct RateLimitStore {
    entries: Mutex<HashMap<ClientIdentity, RateLimitEntry>>,
    window: Duration,
    max_requests: u32,
}

impl RateLimitStore {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window,
            max_requests,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Count one request from `identity` at `now`.
    pub fn check(&self, identity: &ClientIdentity, now: Instant) -> Decision {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if entries.len() > SWEEP_THRESHOLD {
            let window = self.window;
            entries.retain(|_, entry| now <= entry.window_start + window);
        }

        let entry = entries.entry(identity.clone()).or_insert(RateLimitEntry {
            window_start: now,
            count: 0,
        });
        if now > entry.window_start + self.window {
            entry.window_start = now;
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);

        let reset_in = (entry.window_start + self.window).saturating_duration_since(now);
        if entry.count > self.max_requests {
            Decision::Limited { reset_in }
        } else {
            Decision::Allowed {
                remaining: self.max_requests - entry.count,
                reset_in,
            }
        }
    }

    /// Number of tracked identities.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Predicate deciding whether an identity bypasses limiting.
pub type Whitelist = Arc<dyn Fn(&ClientIdentity) -> bool + Send + Sync>;

/// State for the rate limiting stage.
pub struct RateLimiter {
    store: RateLimitStore,
    whitelist: Whitelist,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let listed: Vec<String> = config.whitelist.clone();
        Self {
            store: RateLimitStore::new(Duration::from_secs(config.window_secs), config.max_requests),
            whitelist: Arc::new(move |identity: &ClientIdentity| {
                listed.iter().any(|entry| entry == identity.as_str())
            }),
            enabled: config.enabled,
        }
    }

    /// Replace the whitelist predicate.
    pub fn with_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.whitelist = whitelist;
        self
    }

    pub fn store(&self) -> &RateLimitStore {
        &self.store
    }
}

/// Middleware function for per-identity rate limiting.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    identity: ClientIdentity,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.enabled || (limiter.whitelist)(&identity) {
        return next.run(request).await;
    }

    let limit = limiter.store.max_requests();
    match limiter.store.check(&identity, Instant::now()) {
        Decision::Allowed { remaining, reset_in } => {
            let mut response = next.run(request).await;
            budget_headers(response.headers_mut(), limit, remaining, reset_in);
            response
        }
        Decision::Limited { reset_in } => {
            let path = request
                .extensions()
                .get::<RequestContext>()
                .map(|ctx| ctx.path.as_str())
                .unwrap_or_else(|| request.uri().path());
            tracing::warn!(client = %identity, path = %path, "Rate limit exceeded");

            let mut response = AppError::RateLimited { retry_after: reset_in }.into_response();
            budget_headers(response.headers_mut(), limit, 0, reset_in);
            response
        }
    }
}

fn budget_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_in: Duration) {
    let reset_at = SystemTime::now()
        .checked_add(reset_in)
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or_default();

    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset_at));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(id: &str) -> ClientIdentity {
        ClientIdentity::new(id)
    }

    #[test]
    fn thirty_pass_thirty_first_rejected() {
        let store = RateLimitStore::new(Duration::from_secs(60), 30);
        let start = Instant::now();

        for i in 0..30u64 {
            let now = start + Duration::from_millis(i * 300);
            assert!(matches!(
                store.check(&client("10.0.0.1"), now),
                Decision::Allowed { .. }
            ));
        }
        assert!(matches!(
            store.check(&client("10.0.0.1"), start + Duration::from_secs(10)),
            Decision::Limited { .. }
        ));
    }

    #[test]
    fn remaining_counts_down() {
        let store = RateLimitStore::new(Duration::from_secs(60), 3);
        let now = Instant::now();

        let remaining: Vec<u32> = (0..3)
            .map(|_| match store.check(&client("a"), now) {
                Decision::Allowed { remaining, .. } => remaining,
                Decision::Limited { .. } => panic!("limited too early"),
            })
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);
    }

    #[test]
    fn window_boundary_resets_count() {
        let store = RateLimitStore::new(Duration::from_secs(60), 2);
        let start = Instant::now();

        store.check(&client("a"), start);
        store.check(&client("a"), start);
        assert!(matches!(store.check(&client("a"), start), Decision::Limited { .. }));

        // Exactly at the boundary the window is still current
        assert!(matches!(
            store.check(&client("a"), start + Duration::from_secs(60)),
            Decision::Limited { .. }
        ));
        assert!(matches!(
            store.check(&client("a"), start + Duration::from_secs(61)),
            Decision::Allowed { remaining: 1, .. }
        ));
    }

    #[test]
    fn rejected_requests_still_count() {
        let store = RateLimitStore::new(Duration::from_secs(60), 1);
        let now = Instant::now();

        store.check(&client("a"), now);
        for _ in 0..5 {
            assert!(matches!(store.check(&client("a"), now), Decision::Limited { .. }));
        }
    }

    #[test]
    fn identities_are_independent() {
        let store = RateLimitStore::new(Duration::from_secs(60), 1);
        let now = Instant::now();

        assert!(matches!(store.check(&client("a"), now), Decision::Allowed { .. }));
        assert!(matches!(store.check(&client("b"), now), Decision::Allowed { .. }));
        assert!(matches!(store.check(&client("a"), now), Decision::Limited { .. }));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn whitelist_from_config() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            whitelist: vec!["127.0.0.1".into()],
            ..Default::default()
        });
        assert!((limiter.whitelist)(&client("127.0.0.1")));
        assert!(!(limiter.whitelist)(&client("10.0.0.1")));
    }

    #[test]
    fn nobody_is_whitelisted_by_default() {
        let limiter = RateLimiter::new(&RateLimitConfig::default());
        assert!(!(limiter.whitelist)(&client("127.0.0.1")));
    }
}
