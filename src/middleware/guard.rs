//! Cheap request checks that run before authentication.
//!
//! 1. A declared `Content-Length` above the limit is rejected with 413
//!    without reading the body. Bodies without a declared length are capped
//!    when handlers read them.
//! 2. With origin enforcement on, a missing or disallowed `Origin` is
//!    rejected with 403.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, ORIGIN};
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::warn;

use crate::error::ProxyError;
use crate::security::OriginPolicy;

#[derive(Debug)]
struct GuardConfig {
    max_body_size: usize,
    origins: Option<OriginPolicy>,
}

/// Request guard layer.
#[derive(Clone, Debug)]
pub struct RequestGuardLayer {
    config: Arc<GuardConfig>,
}

impl RequestGuardLayer {
    /// `origins = None` disables origin enforcement.
    pub fn new(max_body_size: usize, origins: Option<OriginPolicy>) -> Self {
        Self {
            config: Arc::new(GuardConfig {
                max_body_size,
                origins,
            }),
        }
    }
}

fn check_request<B>(config: &GuardConfig, req: &Request<B>) -> Result<(), ProxyError> {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    if let Some(length) = declared
        && length > config.max_body_size as u64
    {
        warn!(content_length = length, "Declared body exceeds limit");
        return Err(ProxyError::PayloadTooLarge {
            limit: config.max_body_size,
        });
    }

    if let Some(origins) = &config.origins {
        let origin = req.headers().get(ORIGIN).and_then(|v| v.to_str().ok());
        if !origins.is_allowed(origin) {
            warn!(origin = origin.unwrap_or("<none>"), "Origin not allowed");
            return Err(ProxyError::Forbidden("Origin not allowed".to_string()));
        }
    }

    Ok(())
}

impl<S> Layer<S> for RequestGuardLayer {
    type Service = RequestGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestGuardService {
            inner,
            config: self.config.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RequestGuardService<S> {
    inner: S,
    config: Arc<GuardConfig>,
}

impl<S> Service<Request<Body>> for RequestGuardService<S>
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
        if let Err(rejection) = check_request(&self.config, &req) {
            return Box::pin(async move { Ok(rejection.into_response()) });
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}
