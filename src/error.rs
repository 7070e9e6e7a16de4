use axum::http::header::{ALLOW, RETRY_AFTER, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;

/// Every way a request can fail, with its HTTP mapping.
///
/// Handlers and middleware return these as `ProxyResult`; the conversion to
/// the JSON envelope happens only in [`IntoResponse`]. CORS and security
/// headers are added afterwards by the outermost layer.
///
/// # Upstream Errors
///
/// Upstream failures are split so callers can tell them apart:
///
/// - `UpstreamStatus` - the upstream answered with a non-2xx status (relayed)
/// - `WrongContentType` - a feed URL returned an HTML page
/// - `EmptyResponse` - a feed URL returned an empty body
/// - `UpstreamUnreachable` - network error or timeout before a response
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method {method} not allowed (allowed: {allowed})")]
    MethodNotAllowed {
        method: String,
        allowed: &'static str,
    },

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Rate limit of {limit} requests per minute exceeded")]
    RateLimited { limit: u32, retry_after_secs: u64 },

    #[error("Upstream {url} answered HTTP {status}")]
    UpstreamStatus { status: u16, url: String },

    #[error("Upstream {url} returned HTML instead of a feed")]
    WrongContentType { url: String },

    #[error("Upstream {url} returned an empty body")]
    EmptyResponse { url: String },

    #[error("Upstream request failed: {message}")]
    UpstreamUnreachable { message: String, url: Option<String> },

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub timestamp: String,
}

impl ErrorEnvelope {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: Some(message.into()),
            url: None,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) | ProxyError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            ProxyError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ProxyError::Forbidden(_) => StatusCode::FORBIDDEN,
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            // Relay the upstream's own error status; anything else is ours.
            ProxyError::UpstreamStatus { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ProxyError::WrongContentType { .. }
            | ProxyError::EmptyResponse { .. }
            | ProxyError::UpstreamUnreachable { .. }
            | ProxyError::Internal(_)
            | ProxyError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code used as the envelope's `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "bad_request",
            ProxyError::InvalidJson(_) => "invalid_json",
            ProxyError::Unauthorized(_) => "unauthorized",
            ProxyError::Forbidden(_) => "forbidden",
            ProxyError::NotFound(_) => "not_found",
            ProxyError::MethodNotAllowed { .. } => "method_not_allowed",
            ProxyError::PayloadTooLarge { .. } => "payload_too_large",
            ProxyError::RateLimited { .. } => "rate_limited",
            ProxyError::UpstreamStatus { .. } => "upstream_error",
            ProxyError::WrongContentType { .. } => "wrong_content_type",
            ProxyError::EmptyResponse { .. } => "empty_response",
            ProxyError::UpstreamUnreachable { .. } => "upstream_unreachable",
            ProxyError::Internal(_) => "internal_error",
            ProxyError::Config(_) => "config_error",
        }
    }

    fn envelope(&self) -> ErrorEnvelope {
        match self {
            // Never expose internal details to clients
            ProxyError::Internal(_) => {
                ErrorEnvelope::new(self.code(), "An internal error occurred")
            }
            ProxyError::Config(_) => {
                ErrorEnvelope::new(self.code(), "Service configuration error")
            }
            ProxyError::InvalidJson(e) => ErrorEnvelope::new(self.code(), sanitize_serde_error(e)),
            ProxyError::BadRequest(msg)
            | ProxyError::Unauthorized(msg)
            | ProxyError::Forbidden(msg)
            | ProxyError::NotFound(msg) => ErrorEnvelope::new(self.code(), msg.as_str()),
            ProxyError::MethodNotAllowed { .. }
            | ProxyError::PayloadTooLarge { .. }
            | ProxyError::RateLimited { .. } => ErrorEnvelope::new(self.code(), self.to_string()),
            ProxyError::UpstreamStatus { url, .. }
            | ProxyError::WrongContentType { url }
            | ProxyError::EmptyResponse { url } => {
                ErrorEnvelope::new(self.code(), self.to_string()).with_url(Some(url.clone()))
            }
            ProxyError::UpstreamUnreachable { message, url } => {
                ErrorEnvelope::new(self.code(), message.as_str()).with_url(url.clone())
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let mut response = (status, axum::Json(self.envelope())).into_response();
        let headers = response.headers_mut();

        match &self {
            ProxyError::Unauthorized(_) => {
                headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Token"));
            }
            ProxyError::MethodNotAllowed { allowed, .. } => {
                headers.insert(ALLOW, HeaderValue::from_static(allowed));
            }
            ProxyError::RateLimited {
                limit,
                retry_after_secs,
            } => {
                headers.insert(RETRY_AFTER, HeaderValue::from(*retry_after_secs));
                headers.insert("x-ratelimit-limit", HeaderValue::from(*limit));
                headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
            }
            _ => {}
        }

        response
    }
}

/// Sanitize serde error messages to avoid leaking internal type information.
fn sanitize_serde_error(e: &serde_json::Error) -> String {
    use serde_json::error::Category;

    let msg = e.to_string();
    let backticked = || {
        let start = msg.find('`')?;
        let rest = msg.get(start + 1..)?;
        let end = rest.find('`')?;
        rest.get(..end)
    };

    match e.classify() {
        Category::Data if msg.starts_with("missing field") => match backticked() {
            Some(field) => format!("Missing required field: {field}"),
            None => "Missing required field".to_string(),
        },
        Category::Data => "Invalid data type in request body".to_string(),
        Category::Syntax | Category::Eof => "Malformed JSON in request body".to_string(),
        Category::Io => "Invalid request format".to_string(),
    }
}

/// Convenience type alias for Results with ProxyError.
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::PayloadTooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ProxyError::EmptyResponse { url: "u".into() }.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_status_is_relayed_when_meaningful() {
        let relayed = ProxyError::UpstreamStatus {
            status: 404,
            url: "u".into(),
        };
        assert_eq!(relayed.status(), StatusCode::NOT_FOUND);

        let odd = ProxyError::UpstreamStatus {
            status: 304,
            url: "u".into(),
        };
        assert_eq!(odd.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_internal_details_not_exposed() {
        let response = ProxyError::Internal("db password is hunter2".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], "internal_error");
        assert!(!body.to_string().contains("hunter2"));
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_feed_errors_carry_url() {
        let response = ProxyError::WrongContentType {
            url: "https://example.com/feed".into(),
        }
        .into_response();

        let body = body_json(response).await;
        assert_eq!(body["error"], "wrong_content_type");
        assert_eq!(body["url"], "https://example.com/feed");
    }

    #[test]
    fn test_rate_limited_headers() {
        let response = ProxyError::RateLimited {
            limit: 60,
            retry_after_secs: 12,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "12");
        assert_eq!(response.headers()["x-ratelimit-limit"], "60");
    }

    #[test]
    fn test_method_not_allowed_sets_allow() {
        let response = ProxyError::MethodNotAllowed {
            method: "PUT".into(),
            allowed: "POST",
        }
        .into_response();
        assert_eq!(response.headers()[ALLOW], "POST");
    }

    #[test]
    fn test_sanitize_missing_field() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Needs {
            url: String,
        }
        let err = serde_json::from_str::<Needs>("{}").unwrap_err();
        assert_eq!(sanitize_serde_error(&err), "Missing required field: url");
    }

    #[test]
    fn test_sanitize_malformed() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert_eq!(sanitize_serde_error(&err), "Malformed JSON in request body");
    }
}
