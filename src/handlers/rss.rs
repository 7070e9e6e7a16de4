//! RSS fetch handler.
//!
//! # Endpoints
//!
//! - `GET <rss path>?url=<feed url>`
//! - `POST <rss path>` with `{"url": "<feed url>"}`
//!
//! Successful fetches are cached for `CACHE_TTL_SECS` (default: 300) under
//! the normalized URL, so equivalent spellings of one URL share an entry.

use axum::body::Body;
use axum::extract::{Query, Request};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, info, instrument};
use url::Url;

use super::util::{parse_json, read_body, require_method};
use crate::error::{ProxyError, ProxyResult};
use crate::feed::{self, FeedRejection};
use crate::metrics;
use crate::models::{CachedFeed, RssQuery, RssRequest};
use crate::security::{CACHE_STATUS_HEADER, PROXIED_URL_HEADER};
use crate::state::AppState;
use crate::validation::parse_http_url;

const DEFAULT_FEED_CONTENT_TYPE: &str = "application/xml";

/// Fetch a feed through the cache.
#[instrument(skip(state, req), fields(method = %req.method()))]
pub async fn handle(state: &AppState, req: Request) -> ProxyResult<Response> {
    require_method(req.method(), &[Method::GET, Method::POST], "GET, POST")?;

    let raw = requested_url(state, req).await?;
    let url = parse_http_url(&raw)?;
    let key = cache_key(&url);

    if let Some(cached) = state.feed_cache.get(&key) {
        metrics::record_cache_lookup(true);
        debug!(url = %url, "Feed served from cache");
        return feed_response(state, &url, cached, "HIT");
    }
    metrics::record_cache_lookup(false);

    let upstream = state.upstream.fetch_feed(&url).await?;

    let format = feed::inspect(&upstream.body).map_err(|rejection| match rejection {
        FeedRejection::Html => ProxyError::WrongContentType {
            url: url.to_string(),
        },
        FeedRejection::Empty => ProxyError::EmptyResponse {
            url: url.to_string(),
        },
    })?;
    info!(url = %url, %format, bytes = upstream.body.len(), "Fetched feed");

    let cached = CachedFeed {
        body: upstream.body,
        content_type: upstream
            .content_type
            .unwrap_or_else(|| DEFAULT_FEED_CONTENT_TYPE.to_string()),
    };
    state.feed_cache.insert(key, cached.clone());

    feed_response(state, &url, cached, "MISS")
}

/// `rss:` plus the canonical serialization of the parsed URL.
pub fn cache_key(url: &Url) -> String {
    format!("rss:{url}")
}

async fn requested_url(state: &AppState, req: Request) -> ProxyResult<String> {
    let url = if req.method() == Method::GET {
        Query::<RssQuery>::try_from_uri(req.uri())
            .map_err(|e| ProxyError::BadRequest(e.body_text()))?
            .0
            .url
    } else {
        let body = read_body(req, state.config.max_request_size).await?;
        parse_json::<RssRequest>(&body)?.url
    };

    url.filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ProxyError::BadRequest("Missing required parameter: url".to_string()))
}

fn feed_response(
    state: &AppState,
    url: &Url,
    feed: CachedFeed,
    cache_status: &'static str,
) -> ProxyResult<Response> {
    let mut headers = HeaderMap::with_capacity(4);
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(&feed.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_FEED_CONTENT_TYPE)),
    );
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_str(&format!(
            "public, max-age={}",
            state.feed_cache.default_ttl().as_secs()
        ))
        .map_err(|e| ProxyError::Internal(e.to_string()))?,
    );
    headers.insert(
        PROXIED_URL_HEADER,
        HeaderValue::from_str(url.as_str()).map_err(|e| ProxyError::Internal(e.to_string()))?,
    );
    headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static(cache_status));

    Ok((StatusCode::OK, headers, Body::from(feed.body)).into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_normalizes() {
        let a = parse_http_url("HTTPS://Example.COM:443/feed/../rss.xml").unwrap();
        let b = parse_http_url("https://example.com/rss.xml").unwrap();
        assert_eq!(cache_key(&a), cache_key(&b));
        assert_eq!(cache_key(&b), "rss:https://example.com/rss.xml");
    }

    #[test]
    fn test_cache_key_keeps_query() {
        let a = parse_http_url("https://example.com/feed?page=1").unwrap();
        let b = parse_http_url("https://example.com/feed?page=2").unwrap();
        assert_ne!(cache_key(&a), cache_key(&b));
    }
}
