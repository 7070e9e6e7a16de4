//! Per-client rate limiting middleware.
//!
//! # Algorithm
//!
//! Delegates to [`SlidingWindowLimiter`]: at most `limit` requests per client
//! in any trailing 60 second window. Rejected requests are not counted.
//!
//! # Response Headers
//!
//! On every admitted request:
//! - `X-RateLimit-Limit`: configured requests per minute
//! - `X-RateLimit-Remaining`: requests left in the current window
//!
//! On rate limit exceeded (429):
//! - `Retry-After`: seconds until the oldest counted request leaves the window
//! - `X-RateLimit-Limit`, `X-RateLimit-Remaining: 0`
//!
//! Client identity comes from [`super::ip::client_id`]; see that module for
//! the spoofing caveats.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderValue, Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::warn;

use super::ip::client_id;
use crate::error::ProxyError;
use crate::metrics;
use crate::store::{RateDecision, SlidingWindowLimiter};

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Rate limiting layer for the tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = SlidingWindowLimiter::new(LimiterSettings::per_minute(60)?, clock);
/// let app = Router::new()
///     .fallback(dispatch)
///     .layer(RateLimitLayer::new(limiter));
/// ```
#[derive(Clone, Debug)]
pub struct RateLimitLayer {
    limiter: SlidingWindowLimiter,
}

impl RateLimitLayer {
    pub fn new(limiter: SlidingWindowLimiter) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone, Debug)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: SlidingWindowLimiter,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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
        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();

        // Extract client identity before moving req
        let client = client_id(&req).into_owned();

        Box::pin(async move {
            let limit = limiter.limit();

            match limiter.check(&client) {
                RateDecision::Allowed { remaining } => {
                    let mut response = inner.call(req).await?;
                    let headers = response.headers_mut();
                    headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
                    headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
                    Ok(response)
                }
                RateDecision::Limited { retry_after } => {
                    let retry_after_secs = retry_after.as_millis().div_ceil(1000).max(1);
                    let retry_after_secs = u64::try_from(retry_after_secs).unwrap_or(u64::MAX);

                    warn!(
                        client_id = %client,
                        path = %req.uri().path(),
                        retry_after_secs,
                        "Rate limit exceeded"
                    );
                    metrics::record_rate_limited();

                    Ok(ProxyError::RateLimited {
                        limit,
                        retry_after_secs,
                    }
                    .into_response())
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::LimiterSettings;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn ok(_req: Request<Body>) -> Result<Response<Body>, std::convert::Infallible> {
        Ok(Response::new(Body::empty()))
    }

    fn request(ip: &str) -> Request<Body> {
        Request::builder()
            .uri("/validate")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    fn layer(limit: u32, clock: Arc<ManualClock>) -> RateLimitLayer {
        let settings = LimiterSettings::per_minute(limit).unwrap();
        RateLimitLayer::new(SlidingWindowLimiter::new(settings, clock))
    }

    #[tokio::test]
    async fn test_allowed_requests_carry_remaining() {
        let service = layer(3, Arc::new(ManualClock::new(0))).layer(tower::service_fn(ok));

        let response = service.oneshot(request("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[LIMIT_HEADER], "3");
        assert_eq!(response.headers()[REMAINING_HEADER], "2");
    }

    #[tokio::test]
    async fn test_over_limit_gets_429() {
        let clock = Arc::new(ManualClock::new(0));
        let service = layer(2, clock.clone()).layer(tower::service_fn(ok));

        for _ in 0..2 {
            let response = service.clone().oneshot(request("10.0.0.1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        clock.advance(Duration::from_millis(1500));
        let response = service.clone().oneshot(request("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        // 58.5s left until the first request leaves the window
        assert_eq!(response.headers()["retry-after"], "59");
        assert_eq!(response.headers()[REMAINING_HEADER], "0");

        // Other clients are unaffected
        let response = service.oneshot(request("10.0.0.2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
