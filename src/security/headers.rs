//! CORS and security response headers.
//!
//! [`SecurityHeaders::for_origin`] builds the full header set that every
//! response must carry. The outermost middleware applies it, so handlers
//! and inner layers never construct it themselves.

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE, CONTENT_SECURITY_POLICY,
    STRICT_TRANSPORT_SECURITY, VARY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::http::{HeaderMap, HeaderValue};

use super::origin::OriginPolicy;

/// Header carrying the signed auth token.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Header a caller may use to pass the upstream LLM credential.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header naming the URL an RSS response was fetched from.
pub const PROXIED_URL_HEADER: &str = "x-proxied-url";

/// Header reporting `HIT` or `MISS` for cacheable responses.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Accept, X-Auth-Token, X-API-Key, X-Request-Id";
const EXPOSE_HEADERS: &str = "X-Proxied-URL, X-Cache, X-Request-Id, Retry-After";
const MAX_AGE_SECS: &str = "86400";

/// Builds CORS and security headers for a request origin.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    origins: OriginPolicy,
}

impl SecurityHeaders {
    pub fn new(origins: OriginPolicy) -> Self {
        Self { origins }
    }

    /// Header set for a request with the given `Origin` header.
    ///
    /// The origin is echoed when allowed, otherwise the policy's fallback
    /// value is used.
    pub fn for_origin(&self, origin: Option<&HeaderValue>) -> HeaderMap {
        let allowed = origin
            .filter(|o| self.origins.is_allowed(o.to_str().ok()))
            .cloned();
        let allow_origin = allowed.unwrap_or_else(|| {
            HeaderValue::from_str(self.origins.fallback_origin())
                .unwrap_or_else(|_| HeaderValue::from_static("null"))
        });

        let mut headers = HeaderMap::with_capacity(11);
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        headers.insert(VARY, HeaderValue::from_static("Origin"));
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        headers.insert(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(EXPOSE_HEADERS),
        );
        headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
        headers.insert(
            STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
        headers.insert(
            CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        );
        headers
    }

    /// Overwrite the security header set onto `target`.
    pub fn apply(&self, origin: Option<&HeaderValue>, target: &mut HeaderMap) {
        for (name, value) in &self.for_origin(origin) {
            target.insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn headers(allowed: &[&str]) -> SecurityHeaders {
        let allowed: Vec<String> = allowed.iter().map(|s| (*s).to_string()).collect();
        SecurityHeaders::new(OriginPolicy::new(&allowed))
    }

    #[test]
    fn test_allowed_origin_is_echoed() {
        let origin = HeaderValue::from_static("http://localhost:3000");
        let map = headers(&["http://localhost"]).for_origin(Some(&origin));
        assert_eq!(map[ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
    }

    #[test]
    fn test_disallowed_origin_gets_fallback() {
        let origin = HeaderValue::from_static("https://evil.test");
        let map = headers(&["https://app.test"]).for_origin(Some(&origin));
        assert_eq!(map[ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.test");
    }

    #[test]
    fn test_missing_origin_gets_fallback() {
        let map = headers(&["*"]).for_origin(None);
        assert_eq!(map[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[test]
    fn test_static_security_headers_present() {
        let map = headers(&[]).for_origin(None);
        assert_eq!(map[ACCESS_CONTROL_ALLOW_ORIGIN], "null");
        assert_eq!(map[X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(map[X_FRAME_OPTIONS], "DENY");
        assert!(map.contains_key(STRICT_TRANSPORT_SECURITY));
        assert!(
            map[ACCESS_CONTROL_ALLOW_HEADERS]
                .to_str()
                .unwrap()
                .contains("X-Auth-Token")
        );
    }

    #[test]
    fn test_apply_overrides_existing() {
        let mut target = HeaderMap::new();
        target.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        target.insert("content-type", HeaderValue::from_static("application/xml"));

        let origin = HeaderValue::from_static("http://localhost");
        headers(&["http://localhost"]).apply(Some(&origin), &mut target);

        assert_eq!(target[ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost");
        assert_eq!(target["content-type"], "application/xml");
    }
}
