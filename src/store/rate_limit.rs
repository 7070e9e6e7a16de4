//! Sliding-window request counter keyed by client identity.
//!
//! # Algorithm
//!
//! Each client owns a bucket of request timestamps. On every check:
//!
//! 1. `window_start = now - window`
//! 2. timestamps older than `window_start` are pruned from the bucket
//! 3. if the remaining count is `>= limit` the request is rejected and
//!    nothing is appended
//! 4. otherwise `now` is appended and the request is allowed
//!
//! So at most `limit` requests pass within any trailing window.
//!
//! # Concurrency
//!
//! Buckets live in a [`DashMap`]. A check holds the bucket's shard lock for
//! its whole read-modify-write, which serializes concurrent updates to the
//! same client. Different clients on different shards proceed in parallel.
//!
//! # Eviction
//!
//! When more than `max_tracked_clients` buckets exist, a sweep drops every
//! bucket whose most recent timestamp is older than `stale_after`. The sweep
//! runs after the decision is made and never influences it.

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::clock::{SharedClock, millis};

/// Length of the sliding window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Number of tracked clients above which stale buckets are swept.
pub const DEFAULT_MAX_TRACKED_CLIENTS: usize = 1000;

/// Idle time after which a bucket is considered stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Error type for rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// The per-window limit cannot be zero.
    #[error("rate limit must be greater than 0; leave the limiter out to disable limiting")]
    ZeroLimit,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request accepted; `remaining` more fit in the current window.
    Allowed { remaining: u32 },
    /// Request rejected; the oldest counted request leaves the window after `retry_after`.
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Tunables for [`SlidingWindowLimiter`].
#[derive(Debug, Clone, Copy)]
pub struct LimiterSettings {
    pub limit: NonZeroU32,
    pub window: Duration,
    pub max_tracked_clients: usize,
    pub stale_after: Duration,
}

impl LimiterSettings {
    /// Settings with the default window, high-water mark and stale threshold.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::ZeroLimit`] if `limit` is 0.
    pub fn per_minute(limit: u32) -> Result<Self, RateLimitError> {
        let limit = NonZeroU32::new(limit).ok_or(RateLimitError::ZeroLimit)?;
        Ok(Self {
            limit,
            window: DEFAULT_WINDOW,
            max_tracked_clients: DEFAULT_MAX_TRACKED_CLIENTS,
            stale_after: DEFAULT_STALE_AFTER,
        })
    }

    pub fn with_eviction(mut self, max_tracked_clients: usize, stale_after: Duration) -> Self {
        self.max_tracked_clients = max_tracked_clients;
        self.stale_after = stale_after;
        self
    }
}

/// Per-client sliding-window rate limiter. Cheap to clone.
#[derive(Clone, Debug)]
pub struct SlidingWindowLimiter {
    inner: Arc<LimiterInner>,
}

#[derive(Debug)]
struct LimiterInner {
    settings: LimiterSettings,
    buckets: DashMap<String, VecDeque<u64>>,
    clock: SharedClock,
}

impl SlidingWindowLimiter {
    pub fn new(settings: LimiterSettings, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                settings,
                buckets: DashMap::new(),
                clock,
            }),
        }
    }

    /// Configured requests per window.
    pub fn limit(&self) -> u32 {
        self.inner.settings.limit.get()
    }

    /// Record a request from `client_id` if it fits in the window.
    pub fn check(&self, client_id: &str) -> RateDecision {
        let settings = &self.inner.settings;
        let limit = settings.limit.get() as usize;
        let window = millis(settings.window);

        let (decision, now) = {
            let mut bucket = self
                .inner
                .buckets
                .entry(client_id.to_owned())
                .or_default();

            // Read time under the bucket lock so appends stay ordered.
            let now = self.inner.clock.now_millis();
            let window_start = now.saturating_sub(window);

            while bucket.front().is_some_and(|&t| t < window_start) {
                bucket.pop_front();
            }

            let decision = if bucket.len() >= limit {
                let oldest = bucket.front().copied().unwrap_or(now);
                let retry_after_ms = (oldest + window).saturating_sub(now);
                RateDecision::Limited {
                    retry_after: Duration::from_millis(retry_after_ms),
                }
            } else {
                bucket.push_back(now);
                let remaining = u32::try_from(limit - bucket.len()).unwrap_or(u32::MAX);
                RateDecision::Allowed { remaining }
            };

            (decision, now)
        };

        if self.inner.buckets.len() > settings.max_tracked_clients {
            self.evict_stale(now);
        }

        decision
    }

    /// Drop buckets whose latest request is older than the stale threshold.
    ///
    /// Returns the number of buckets removed.
    pub fn evict_stale(&self, now: u64) -> usize {
        let oldest_allowed = now.saturating_sub(millis(self.inner.settings.stale_after));
        let before = self.inner.buckets.len();

        self.inner
            .buckets
            .retain(|_, bucket| bucket.back().is_some_and(|&t| t >= oldest_allowed));

        let removed = before.saturating_sub(self.inner.buckets.len());
        if removed > 0 {
            debug!(
                removed,
                remaining = self.inner.buckets.len(),
                "Evicted stale rate limit buckets"
            );
        }
        removed
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.inner.buckets.len()
    }

    /// Timestamps currently stored for `client_id`, oldest first.
    pub fn bucket(&self, client_id: &str) -> Option<Vec<u64>> {
        self.inner
            .buckets
            .get(client_id)
            .map(|b| b.iter().copied().collect())
    }
}
