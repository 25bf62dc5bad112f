//! Per-client sliding-window rate limiting
//!
//! Each client key gets a window anchored at its first request. Within the
//! window at most `limit` requests are admitted; once the window has
//! elapsed the entry is purged and the next request starts a fresh one.
//!
//! All bookkeeping happens under one mutex: purge, lookup and increment
//! are a single critical section, so N racing requests from one key admit
//! exactly `limit`. The lock is never held across an await.

use crate::clock::{system_clock, SharedClock};
use crate::config::RateLimitConfig;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// Key used when the peer address is not known
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Longest accepted window, in seconds
pub const MAX_WINDOW_SECS: u64 = 86_400;

/// Tracking state for one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindowEntry {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Rejected,
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Sliding-window limiter shared by all requests of one server
///
/// Cloning shares the underlying map.
#[derive(Clone)]
pub struct RateLimiter {
    entries: Arc<Mutex<HashMap<String, RateWindowEntry>>>,
    limit: u32,
    window: Duration,
    bypass: bool,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration, bypass: bool, clock: SharedClock) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            limit,
            window,
            bypass,
            clock,
        }
    }

    /// Build from configuration, rejecting a zero limit or an out-of-range window
    pub fn from_config(config: &RateLimitConfig, clock: SharedClock) -> anyhow::Result<Self> {
        if config.requests_limit == 0 {
            anyhow::bail!("rate_limit.requests_limit must be at least 1");
        }
        if !(1..=MAX_WINDOW_SECS).contains(&config.window_size_secs) {
            anyhow::bail!(
                "rate_limit.window_size_secs must be between 1 and {}",
                MAX_WINDOW_SECS
            );
        }

        Ok(Self::new(
            config.requests_limit,
            Duration::seconds(config.window_size_secs as i64),
            config.bypass,
            clock,
        ))
    }

    /// Limiter on the wall clock
    pub fn with_system_clock(limit: u32, window: Duration) -> Self {
        Self::new(limit, window, false, system_clock())
    }

    /// Record a request from `key` and decide whether to admit it
    pub fn check(&self, key: &str) -> RateDecision {
        if self.bypass {
            return RateDecision::Allowed;
        }

        let now = self.clock.now();
        let mut entries = self.entries.lock();

        entries.retain(|_, entry| now - entry.window_start <= self.window);

        let decision = match entries.get_mut(key) {
            None if self.limit == 0 => RateDecision::Rejected,
            None => {
                entries.insert(
                    key.to_string(),
                    RateWindowEntry {
                        count: 1,
                        window_start: now,
                    },
                );
                RateDecision::Allowed
            }
            Some(entry) if entry.count < self.limit => {
                entry.count += 1;
                RateDecision::Allowed
            }
            Some(_) => RateDecision::Rejected,
        };

        gauge!("rate_limit_tracked_clients").set(entries.len() as f64);
        decision
    }

    /// Current entry for `key`, if tracked
    pub fn entry(&self, key: &str) -> Option<RateWindowEntry> {
        self.entries.lock().get(key).copied()
    }

    /// Number of tracked client keys
    pub fn tracked_clients(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Client key for a request: peer IP, or [`UNKNOWN_CLIENT`]
pub fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Rate limiting middleware
///
/// Rejected requests never reach the handler and get a plain-text 429.
pub async fn rate_limit(State(limiter): State<RateLimiter>, request: Request, next: Next) -> Response {
    let key = client_key(&request);

    match limiter.check(&key) {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Rejected => {
            warn!(client = %key, path = %request.uri().path(), "Rate limit exceeded");
            counter!("rate_limit_rejections_total").increment(1);
            ApiError::RateLimited.into_response()
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("bypass", &self.bypass)
            .finish()
    }
}
