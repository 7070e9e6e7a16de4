//! Signed token authentication middleware.
//!
//! # Security Features
//!
//! - **Signed, expiring tokens**: see [`crate::security::token`] for the format
//! - **Constant-time verification**: the HMAC is checked with `verify_slice`
//! - **Brute-force protection**: per-client failure budget (governor)
//! - **Fail closed**: without `AUTH_SECRET` every token is rejected
//!
//! # Usage
//!
//! ```bash
//! AUTH_SECRET=change-me cargo run
//! curl -H "X-Auth-Token: <payload>.<signature>" http://localhost:8787/rss?url=...
//! ```
//!
//! Preflight requests never reach this layer; they are answered by
//! [`super::cors`].

use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use dashmap::DashMap;
use governor::clock::{Clock as _, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::ip::client_id;
use crate::clock::{SharedClock, millis};
use crate::error::ProxyError;
use crate::metrics;
use crate::security::{AUTH_TOKEN_HEADER, TokenValidator};

/// Burst of failed attempts tolerated before the per-minute budget applies.
const AUTH_FAILURE_BURST: u32 = 5;

/// Tracked failing clients above which idle entries are swept.
const FAILURE_SWEEP_THRESHOLD: usize = 1000;

type FailureLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Per-client tracking of failed authentication attempts.
///
/// Failures consume governor cells. Once the budget is exhausted the client
/// is blocked until the limiter would admit another failure, so successful
/// requests never count against it.
struct FailureGuard {
    limiter: FailureLimiter,
    blocked_until: DashMap<String, u64>,
    per_minute: u32,
    clock: SharedClock,
}

impl FailureGuard {
    fn new(per_minute: NonZeroU32, clock: SharedClock) -> Self {
        let burst = NonZeroU32::new(AUTH_FAILURE_BURST.min(per_minute.get())).unwrap_or(per_minute);
        Self {
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute).allow_burst(burst)),
            blocked_until: DashMap::new(),
            per_minute: per_minute.get(),
            clock,
        }
    }

    /// Seconds left on an active block, if any.
    fn blocked_for(&self, client: &str) -> Option<u64> {
        let now = self.clock.now_millis();
        let until = *self.blocked_until.get(client)?;
        if until > now {
            Some((until - now).div_ceil(1000).max(1))
        } else {
            self.blocked_until.remove_if(client, |_, until| *until <= now);
            None
        }
    }

    /// Record a failure, returning the block duration if the budget is now spent.
    fn record_failure(&self, client: &str) -> Option<u64> {
        if self.limiter.len() >= FAILURE_SWEEP_THRESHOLD
            || self.blocked_until.len() >= FAILURE_SWEEP_THRESHOLD
        {
            self.sweep();
        }

        let not_until = self.limiter.check_key(&client.to_string()).err()?;
        let wait = not_until.wait_time_from(DefaultClock::default().now());
        let until = self.clock.now_millis().saturating_add(millis(wait));
        self.blocked_until.insert(client.to_string(), until);
        Some(wait.as_secs().max(1))
    }

    /// Drop expired blocks and clients whose failure budget has refilled.
    fn sweep(&self) {
        let now = self.clock.now_millis();
        let (keys, blocks) = (self.limiter.len(), self.blocked_until.len());

        self.blocked_until.retain(|_, until| *until > now);
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();

        debug!(
            limiter_keys_removed = keys.saturating_sub(self.limiter.len()),
            blocks_removed = blocks.saturating_sub(self.blocked_until.len()),
            "Swept auth failure state"
        );
    }
}

/// Token authentication layer.
///
/// When disabled (`REQUIRE_AUTH=false`) requests pass through untouched.
#[derive(Clone)]
pub struct TokenAuthLayer {
    validator: TokenValidator,
    failures: Option<Arc<FailureGuard>>,
    enabled: bool,
}

impl TokenAuthLayer {
    /// Create an auth layer.
    ///
    /// * `failure_limit_per_minute` - failed attempts per client per minute
    ///   before 429; `0` disables brute-force tracking.
    pub fn new(
        validator: TokenValidator,
        enabled: bool,
        failure_limit_per_minute: u32,
        clock: SharedClock,
    ) -> Self {
        let failures = NonZeroU32::new(failure_limit_per_minute)
            .filter(|_| enabled)
            .map(|limit| Arc::new(FailureGuard::new(limit, clock)));

        Self {
            validator,
            failures,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl<S> Layer<S> for TokenAuthLayer {
    type Service = TokenAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TokenAuthService {
            inner,
            validator: self.validator.clone(),
            failures: self.failures.clone(),
            enabled: self.enabled,
        }
    }
}

/// Token authentication service wrapper.
#[derive(Clone)]
pub struct TokenAuthService<S> {
    inner: S,
    validator: TokenValidator,
    failures: Option<Arc<FailureGuard>>,
    enabled: bool,
}

impl<S> Service<Request<Body>> for TokenAuthService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let validator = self.validator.clone();
        let failures = self.failures.clone();
        let enabled = self.enabled;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if !enabled {
                return inner.call(req).await;
            }

            let client = client_id(&req).into_owned();

            if let Some(retry_after) = failures.as_ref().and_then(|f| f.blocked_for(&client)) {
                warn!(
                    client_id = %client,
                    retry_after_secs = retry_after,
                    "Client blocked due to excessive auth failures"
                );
                metrics::record_auth_failure("blocked");
                return Ok(too_many_failures(failures.as_deref(), retry_after));
            }

            let verdict = req
                .headers()
                .get(AUTH_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.trim().is_empty())
                .map(|token| validator.validate(token));

            let (reason, message) = match verdict {
                Some(true) => {
                    debug!("Token authentication successful");
                    return inner.call(req).await;
                }
                Some(false) => ("invalid", "Invalid or expired auth token"),
                None => ("missing", "Auth token required"),
            };

            metrics::record_auth_failure(reason);
            warn!(
                path = %req.uri().path(),
                client_id = %client,
                reason,
                "Authentication failed"
            );

            if let Some(retry_after) = failures.as_ref().and_then(|f| f.record_failure(&client)) {
                return Ok(too_many_failures(failures.as_deref(), retry_after));
            }

            Ok(ProxyError::Unauthorized(message.to_string()).into_response())
        })
    }
}

fn too_many_failures(failures: Option<&FailureGuard>, retry_after: u64) -> Response<Body> {
    ProxyError::RateLimited {
        limit: failures.map_or(0, |f| f.per_minute),
        retry_after_secs: retry_after,
    }
    .into_response()
}
