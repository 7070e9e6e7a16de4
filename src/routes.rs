//! Routing and the middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────────┐
//! │ Security headers     │ ← OPTIONS answered here (204); headers on every response
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │ Catch panic          │ ← panic → 500 envelope
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │ Request ID + tracing │ ← X-Request-Id set/propagated, request span
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │ Request guard        │ ← 413 oversized, 403 disallowed origin
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │ Token auth           │ ← 401 invalid token, 429 repeated failures
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │ Rate limiter         │ ← 429 over the per-client window
//! └──────────┬───────────┘
//!            ▼
//!   dispatch → handler     ← 404 unknown path, 405 wrong method
//! ```
//!
//! There are no axum routes: every path goes to [`dispatch`], which looks
//! the path up in the configurable [`RouteTable`].

use std::any::Any;
use std::collections::HashMap;

use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderName, Response};
use axum::response::IntoResponse;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span};

use crate::config::Config;
use crate::error::ProxyError;
use crate::handlers;
use crate::metrics;
use crate::middleware::{RateLimitLayer, RequestGuardLayer, SecurityHeadersLayer, TokenAuthLayer};
use crate::state::AppState;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Handler kinds the proxy can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Rss,
    Llm,
    Validate,
}

impl Route {
    /// Label used in logs and metrics.
    pub fn name(self) -> &'static str {
        match self {
            Route::Rss => "rss",
            Route::Llm => "llm",
            Route::Validate => "validate",
        }
    }
}

/// Exact-match path → [`Route`] table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    paths: HashMap<String, Route>,
}

impl RouteTable {
    pub fn from_config(config: &Config) -> Self {
        let mut table = Self::default();
        table.extend(&config.rss_paths, Route::Rss);
        table.extend(&config.llm_paths, Route::Llm);
        table.extend(&config.validate_paths, Route::Validate);
        table
    }

    fn extend(&mut self, paths: &[String], route: Route) {
        for path in paths {
            self.paths.insert(path.clone(), route);
        }
    }

    pub fn resolve(&self, path: &str) -> Option<Route> {
        self.paths.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Build the proxy router with the full middleware stack.
///
/// Layers are added innermost first; each `.layer()` call wraps everything
/// added before it.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let mut router = Router::new()
        .fallback(dispatch)
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(config.max_request_size));

    // Rate limiting (if enabled) - innermost, runs after auth
    if let Some(limiter) = state.limiter.clone() {
        info!(
            per_minute = limiter.limit(),
            max_tracked_clients = config.rate_limit_max_clients,
            "Rate limiting enabled"
        );
        router = router.layer(RateLimitLayer::new(limiter));
    } else {
        info!("Rate limiting disabled (RATE_LIMIT_PER_MINUTE=0)");
    }

    // Token authentication (if required)
    if config.require_auth {
        if !state.tokens.has_secret() {
            error!("REQUIRE_AUTH is on but AUTH_SECRET is unset; every request will be rejected");
        }
        info!("Token authentication enabled");
        router = router.layer(TokenAuthLayer::new(
            state.tokens.clone(),
            true,
            config.auth_failure_limit_per_minute,
            state.clock.clone(),
        ));
    } else {
        info!("Token authentication disabled (REQUIRE_AUTH=false)");
    }

    // Size and origin checks
    let enforced_origins = config.enforce_origin.then(|| state.origins.clone());
    info!(
        max_request_size = config.max_request_size,
        enforce_origin = config.enforce_origin,
        "Request guard configured"
    );
    router = router.layer(RequestGuardLayer::new(
        config.max_request_size,
        enforced_origins,
    ));

    // Tracing, inside request id so the span can record it
    router = router.layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id,
        )
    }));
    router = router.layer(PropagateRequestIdLayer::new(request_id.clone()));
    router = router.layer(SetRequestIdLayer::new(request_id, MakeRequestUuid));

    // Panics become a 500 envelope; the header layer below still applies
    router = router.layer(CatchPanicLayer::custom(render_panic));

    // Outermost: preflight + CORS/security headers on every response
    router.layer(SecurityHeadersLayer::new(state.security_headers.clone()))
}

/// Resolve the path and run the matching handler.
pub async fn dispatch(State(state): State<AppState>, req: Request) -> Response<Body> {
    let path = req.uri().path().to_string();

    let Some(route) = state.routes.resolve(&path) else {
        let response = ProxyError::NotFound(format!("No handler for {path}")).into_response();
        metrics::record_request("none", response.status().as_u16());
        return response;
    };

    let result = match route {
        Route::Rss => handlers::rss::handle(&state, req).await,
        Route::Llm => handlers::llm::handle(&state, req).await,
        Route::Validate => {
            handlers::validate::handle(req, state.config.max_request_size).await
        }
    };

    let response = result.unwrap_or_else(IntoResponse::into_response);
    metrics::record_request(route.name(), response.status().as_u16());
    response
}

/// Turn a caught panic into the `internal_error` envelope.
///
/// The payload is logged, never sent to the client.
pub fn render_panic(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");

    ProxyError::Internal(format!("handler panicked: {detail}")).into_response()
}
