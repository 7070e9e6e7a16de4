//! Shared proxy state for handlers and middleware.
//!
//! Holds the two mutable stores (rate-limit buckets and the feed cache),
//! the token validator, the upstream client and the configuration. Every
//! component is cheap to clone and safe for concurrent use.
//!
//! # Structured Concurrency
//!
//! Background maintenance is managed with `tokio_util::task::TaskTracker`
//! and a `CancellationToken`. Tasks are started explicitly with
//! [`AppState::spawn_background_tasks`]; call [`AppState::shutdown`] to stop
//! them before exit.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use crate::clock::{SharedClock, SystemClock};
use crate::config::Config;
use crate::error::{ProxyError, ProxyResult};
use crate::metrics;
use crate::models::CachedFeed;
use crate::routes::RouteTable;
use crate::security::{OriginPolicy, SecurityHeaders, TokenValidator};
use crate::store::{LimiterSettings, ResponseCache, SlidingWindowLimiter};
use crate::upstream::UpstreamClient;

/// Shared proxy state.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config)?;
/// state.spawn_background_tasks();
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<Config>,
    pub routes: Arc<RouteTable>,
    /// `None` when `RATE_LIMIT_PER_MINUTE=0`
    pub limiter: Option<SlidingWindowLimiter>,
    pub feed_cache: ResponseCache<CachedFeed>,
    pub tokens: TokenValidator,
    pub origins: OriginPolicy,
    pub security_headers: SecurityHeaders,
    pub upstream: UpstreamClient,
    pub clock: SharedClock,
    pub started_at: Instant,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create state backed by the system clock.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` if a component cannot be built from `config`.
    pub fn new(config: Config) -> ProxyResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create state with an explicit clock, used by tests to simulate time.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` if a component cannot be built from `config`.
    pub fn with_clock(config: Config, clock: SharedClock) -> ProxyResult<Self> {
        config.validate()?;

        let limiter = if config.rate_limiting_enabled() {
            let settings = LimiterSettings::per_minute(config.rate_limit_per_minute)
                .map_err(|e| ProxyError::Config(e.to_string()))?
                .with_eviction(config.rate_limit_max_clients, config.rate_limit_stale_after);
            Some(SlidingWindowLimiter::new(settings, clock.clone()))
        } else {
            None
        };

        let origins = OriginPolicy::new(&config.allowed_origins);
        let upstream = UpstreamClient::from_config(&config)?;

        Ok(Self {
            routes: Arc::new(RouteTable::from_config(&config)),
            limiter,
            feed_cache: ResponseCache::new(config.cache_ttl, clock.clone()),
            tokens: TokenValidator::new(config.auth_secret.as_deref(), clock.clone()),
            security_headers: SecurityHeaders::new(origins.clone()),
            origins,
            upstream,
            clock,
            config: Arc::new(config),
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Start the periodic cache purge.
    ///
    /// The task is tracked by `task_tracker` and stops on `shutdown()`.
    pub fn spawn_background_tasks(&self) {
        let cache = self.feed_cache.clone();
        let limiter = self.limiter.clone();
        let every = self.config.cache_sweep_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(every);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Cache maintenance task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            trace!(purged, "Purged expired cache entries");
                        }
                        let clients = limiter.as_ref().map_or(0, SlidingWindowLimiter::tracked_clients);
                        metrics::set_store_sizes(clients, cache.len());
                    }
                }
            }

            debug!("Cache maintenance task shutting down");
        });
    }

    /// Gracefully stop all background tasks.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use axum::body::Bytes;
    use std::time::Duration;

    #[test]
    fn test_rate_limit_zero_disables_limiter() {
        let config = Config {
            rate_limit_per_minute: 0,
            ..Config::default()
        };
        let state = AppState::new(config).unwrap();
        assert!(state.limiter.is_none());
        assert!(AppState::new(Config::default()).unwrap().limiter.is_some());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config {
            max_request_size: 0,
            ..Config::default()
        };
        assert!(matches!(AppState::new(config), Err(ProxyError::Config(_))));
    }

    #[tokio::test]
    async fn test_background_purge_and_shutdown() {
        let clock = Arc::new(ManualClock::new(0));
        let config = Config {
            cache_sweep_interval: Duration::from_millis(10),
            cache_ttl: Duration::from_secs(1),
            ..Config::default()
        };
        let state = AppState::with_clock(config, clock.clone()).unwrap();
        state.feed_cache.insert(
            "rss:https://example.com/",
            CachedFeed {
                body: Bytes::from_static(b"<rss/>"),
                content_type: "application/xml".to_string(),
            },
        );
        state.spawn_background_tasks();

        clock.advance(Duration::from_secs(2));
        tokio::time::timeout(Duration::from_secs(5), async {
            while !state.feed_cache.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("expired entry should be purged");

        tokio::time::timeout(Duration::from_secs(5), state.shutdown())
            .await
            .expect("shutdown should complete");
    }
}
