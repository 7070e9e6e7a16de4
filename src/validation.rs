//! Input format checks shared by the handlers and the `/validate` endpoint.
//!
//! These are pure predicates over caller input. They never fail; anything
//! unexpected is simply "not valid".

use url::Url;

use crate::error::{ProxyError, ProxyResult};
use crate::models::ValidationResponse;

// =============================================================================
// Validation Constants
// =============================================================================

/// Credential-shaped strings must be strictly longer than this.
pub const MIN_API_KEY_LENGTH: usize = 21;

/// Schemes the proxy is willing to fetch.
const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

/// Parse `raw` as an absolute `http`/`https` URL.
///
/// # Errors
///
/// Returns `ProxyError::BadRequest` for anything else.
pub fn parse_http_url(raw: &str) -> ProxyResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ProxyError::BadRequest(format!("Invalid URL: {e}")))?;

    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return Err(ProxyError::BadRequest(format!(
            "Invalid URL: scheme '{}' is not allowed",
            url.scheme()
        )));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ProxyError::BadRequest("Invalid URL: missing host".to_string()));
    }

    Ok(url)
}

pub fn is_valid_url(raw: &str) -> bool {
    parse_http_url(raw).is_ok()
}

/// Length at least [`MIN_API_KEY_LENGTH`] and only `[A-Za-z0-9_-]`.
pub fn is_valid_api_key_format(key: &str) -> bool {
    key.len() >= MIN_API_KEY_LENGTH
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Kinds of input the `/validate` endpoint understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    Url,
    Rss,
    ApiKey,
}

impl ValidationKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "url" => Some(Self::Url),
            "rss" => Some(Self::Rss),
            "api_key" | "apiKey" => Some(Self::ApiKey),
            _ => None,
        }
    }

    fn check(self, value: &str) -> bool {
        match self {
            Self::Url | Self::Rss => is_valid_url(value),
            Self::ApiKey => is_valid_api_key_format(value),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Url => "URL",
            Self::Rss => "RSS URL",
            Self::ApiKey => "API key format",
        }
    }
}

/// Run the check named by `kind` against `value`.
///
/// Unknown kinds and non-string values produce `is_valid = false` with an
/// explanatory message rather than an error.
pub fn validate(kind: Option<&str>, value: Option<&serde_json::Value>) -> ValidationResponse {
    let Some(kind) = kind.and_then(ValidationKind::parse) else {
        return ValidationResponse::invalid("Unknown validation type");
    };

    let Some(value) = value.and_then(serde_json::Value::as_str) else {
        return ValidationResponse::invalid(format!("Invalid {}: value must be a string", kind.label()));
    };

    if kind.check(value) {
        ValidationResponse::valid(format!("Valid {}", kind.label()))
    } else {
        ValidationResponse::invalid(format!("Invalid {}", kind.label()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_urls_accepted() {
        assert!(is_valid_url("https://example.com/feed.xml"));
        assert!(is_valid_url("http://localhost:8080/rss"));
        assert!(is_valid_url("  https://example.com  "));
    }

    #[test]
    fn test_other_schemes_rejected() {
        assert!(!is_valid_url("ftp://example.com/feed"));
        assert!(!is_valid_url("file:///etc/passwd"));
        assert!(!is_valid_url("javascript:alert(1)"));
        assert!(!is_valid_url("not a url"));
        assert!(!is_valid_url(""));
    }

    #[test]
    fn test_parse_http_url_reports_bad_request() {
        let err = parse_http_url("gopher://example.com").unwrap_err();
        assert!(matches!(err, ProxyError::BadRequest(_)));
        assert!(err.to_string().contains("gopher"));
    }

    #[test]
    fn test_api_key_format() {
        assert!(is_valid_api_key_format("sk-ant-REDACTED"));
        // exactly 21 characters
        assert!(is_valid_api_key_format("abcdefghijklmnopqrstu"));
        // 20 characters
        assert!(!is_valid_api_key_format("abcdefghijklmnopqrst"));
        assert!(!is_valid_api_key_format("sk-ant-api03-abc def ghij"));
        assert!(!is_valid_api_key_format("sk-ant-api03-abcdéfghijkl"));
    }

    #[test]
    fn test_validate_known_types() {
        let result = validate(Some("url"), Some(&json!("https://example.com")));
        assert!(result.is_valid);
        assert_eq!(result.message, "Valid URL");

        let result = validate(Some("rss"), Some(&json!("ftp://x")));
        assert!(!result.is_valid);
        assert_eq!(result.message, "Invalid RSS URL");

        let result = validate(Some("apiKey"), Some(&json!("short")));
        assert!(!result.is_valid);
        assert_eq!(result.message, "Invalid API key format");
    }

    #[test]
    fn test_validate_unknown_type() {
        let result = validate(Some("email"), Some(&json!("a@b.c")));
        assert!(!result.is_valid);
        assert_eq!(result.message, "Unknown validation type");

        assert!(!validate(None, Some(&json!("x"))).is_valid);
    }

    #[test]
    fn test_validate_non_string_value() {
        let result = validate(Some("url"), Some(&json!(42)));
        assert!(!result.is_valid);
        assert!(validate(Some("api_key"), None).message.contains("string"));
    }
}
