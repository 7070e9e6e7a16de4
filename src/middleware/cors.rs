//! Outermost layer: preflight handling and response headers.
//!
//! - `OPTIONS` requests are answered here with `204 No Content` and the
//!   header set; they never reach auth, rate limiting or routing.
//! - Every other response, including errors produced by inner layers and
//!   rendered panics, gets the full [`SecurityHeaders`] set. Same-named
//!   headers set further in are overwritten.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::ORIGIN;
use axum::http::{Method, Request, Response, StatusCode};
use tower::{Layer, Service};
use tracing::debug;

use crate::security::SecurityHeaders;

#[derive(Clone, Debug)]
pub struct SecurityHeadersLayer {
    headers: SecurityHeaders,
}

impl SecurityHeadersLayer {
    pub fn new(headers: SecurityHeaders) -> Self {
        Self { headers }
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersService {
            inner,
            headers: self.headers.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SecurityHeadersService<S> {
    inner: S,
    headers: SecurityHeaders,
}

impl<S> Service<Request<Body>> for SecurityHeadersService<S>
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
        let headers = self.headers.clone();
        let origin = req.headers().get(ORIGIN).cloned();

        if req.method() == Method::OPTIONS {
            debug!(path = %req.uri().path(), "Answering preflight");
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::NO_CONTENT;
            headers.apply(origin.as_ref(), response.headers_mut());
            return Box::pin(async move { Ok(response) });
        }

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let mut response = inner.call(req).await?;
            headers.apply(origin.as_ref(), response.headers_mut());
            Ok(response)
        })
    }
}
