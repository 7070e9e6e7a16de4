//! Outbound HTTP to feed hosts and the LLM API.
//!
//! One [`reqwest::Client`] is shared by all requests. It applies the
//! configured timeout to every call, follows redirects and never retries;
//! a timeout surfaces as [`ProxyError::UpstreamUnreachable`].

use std::time::{Duration, Instant};

use axum::body::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use reqwest::redirect::Policy;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::error::{ProxyError, ProxyResult};
use crate::metrics;

/// `Accept` header sent on feed fetches.
pub const FEED_ACCEPT: &str =
    "application/rss+xml, application/xml, text/xml, application/atom+xml, */*";

const MAX_REDIRECTS: usize = 10;

/// Body and metadata of a successful upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Shared client for all upstream calls. Cheap to clone.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    timeout: Duration,
    llm_api_url: Url,
    llm_api_version: HeaderValue,
}

impl UpstreamClient {
    /// Build the client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` if the TLS backend fails to initialize or
    /// a configured header or URL is invalid.
    pub fn from_config(config: &Config) -> ProxyResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .user_agent(config.feed_user_agent.as_str())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to build HTTP client: {e}")))?;

        let llm_api_url = Url::parse(&config.llm_api_url)
            .map_err(|e| ProxyError::Config(format!("Invalid LLM_API_URL: {e}")))?;
        let llm_api_version = HeaderValue::from_str(&config.llm_api_version)
            .map_err(|e| ProxyError::Config(format!("Invalid LLM_API_VERSION: {e}")))?;

        Ok(Self {
            http,
            timeout: config.upstream_timeout,
            llm_api_url,
            llm_api_version,
        })
    }

    /// GET a feed. Non-2xx answers become [`ProxyError::UpstreamStatus`].
    #[instrument(skip(self, url), fields(url = %url))]
    pub async fn fetch_feed(&self, url: &Url) -> ProxyResult<UpstreamResponse> {
        let started = Instant::now();
        let result = self
            .http
            .get(url.clone())
            .header(ACCEPT, FEED_ACCEPT)
            .send()
            .await;
        metrics::record_upstream_duration("feed", started.elapsed().as_secs_f64());

        let response = result.map_err(|e| self.unreachable("feed", e, Some(url.as_str())))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Feed host answered with an error");
            metrics::record_upstream_error("feed", "status");
            return Err(ProxyError::UpstreamStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = content_type(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| self.unreachable("feed", e, Some(url.as_str())))?;

        debug!(bytes = body.len(), "Fetched feed");
        Ok(UpstreamResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }

    /// POST a JSON payload to the LLM API.
    ///
    /// The upstream status is relayed as-is, including error statuses.
    #[instrument(skip(self, api_key, payload), fields(bytes = payload.len()))]
    pub async fn forward_llm(
        &self,
        api_key: &str,
        payload: Vec<u8>,
    ) -> ProxyResult<UpstreamResponse> {
        let mut api_key = HeaderValue::from_str(api_key).map_err(|_| {
            ProxyError::BadRequest("API key contains invalid characters".to_string())
        })?;
        api_key.set_sensitive(true);

        let started = Instant::now();
        let result = self
            .http
            .post(self.llm_api_url.clone())
            .header("x-api-key", api_key)
            .header("anthropic-version", self.llm_api_version.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await;
        metrics::record_upstream_duration("llm", started.elapsed().as_secs_f64());

        let response = result.map_err(|e| self.unreachable("llm", e, None))?;
        let status = response.status().as_u16();
        let content_type = content_type(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| self.unreachable("llm", e, None))?;

        if status >= 400 {
            warn!(status, "LLM API answered with an error");
            metrics::record_upstream_error("llm", "status");
        }

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }

    fn unreachable(
        &self,
        upstream: &'static str,
        err: reqwest::Error,
        url: Option<&str>,
    ) -> ProxyError {
        let message = if err.is_timeout() {
            metrics::record_upstream_error(upstream, "timeout");
            format!("Upstream request timed out after {}s", self.timeout.as_secs())
        } else {
            metrics::record_upstream_error(upstream, "network");
            // The URL may carry caller data; it is reported separately
            format!("Upstream request failed: {}", err.without_url())
        };

        ProxyError::UpstreamUnreachable {
            message,
            url: url.map(str::to_string),
        }
    }
}

fn content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
