//! Client identity extraction for rate limiting and brute-force protection.
//!
//! # Header Priority
//!
//! 1. `CF-Connecting-IP` (set by the Cloudflare edge)
//! 2. `X-Forwarded-For`, first entry of the comma-separated list
//! 3. `X-Real-IP`
//! 4. [`UNKNOWN_CLIENT`]
//!
//! Empty or non-ASCII header values are skipped.
//!
//! # Security Warning: Spoofing
//!
//! **These headers are client-controlled.** The identity is only a
//! rate-limit bucket key and must never be used for authorization. Deploy
//! behind an edge that overwrites the header, otherwise clients can rotate
//! values to dodge per-client limits.
//!
//! All requests without identifying headers share the `"unknown"` bucket.

use std::borrow::Cow;

use axum::http::Request;
use tracing::debug;

/// Bucket key for requests that carry no identifying header.
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Cloudflare,
    ForwardedFor,
    RealIp,
}

fn header_value<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[inline]
fn extract<B>(req: &Request<B>) -> Option<(&str, Source)> {
    if let Some(ip) = header_value(req, "cf-connecting-ip") {
        return Some((ip, Source::Cloudflare));
    }

    // Format: "client, proxy1, proxy2" - we want the first (client) entry
    if let Some(ip) = header_value(req, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some((ip, Source::ForwardedFor));
    }

    header_value(req, "x-real-ip").map(|ip| (ip, Source::RealIp))
}

/// Client identity for `req`.
///
/// Borrowed for the `"unknown"` fallback, owned otherwise. Call
/// `.into_owned()` before moving it into an async block.
#[inline]
pub fn client_id<B>(req: &Request<B>) -> Cow<'static, str> {
    match extract(req) {
        Some((ip, source)) => {
            debug!(client_id = %ip, ?source, "Resolved client identity");
            Cow::Owned(ip.to_string())
        }
        None => Cow::Borrowed(UNKNOWN_CLIENT),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_cloudflare_header_wins() {
        let req = request(&[
            ("cf-connecting-ip", "198.51.100.7"),
            ("x-forwarded-for", "10.0.0.1"),
            ("x-real-ip", "192.168.1.1"),
        ]);
        assert_eq!(client_id(&req), "198.51.100.7");
    }

    #[test]
    fn test_forwarded_for_first_entry() {
        let req = request(&[("x-forwarded-for", "  203.0.113.50 , 70.41.3.18")]);
        assert_eq!(client_id(&req), "203.0.113.50");
    }

    #[test]
    fn test_forwarded_for_priority_over_real_ip() {
        let req = request(&[("x-forwarded-for", "10.0.0.1"), ("x-real-ip", "192.168.1.1")]);
        assert_eq!(client_id(&req), "10.0.0.1");
    }

    #[test]
    fn test_real_ip_fallback() {
        let req = request(&[("x-real-ip", "192.168.1.1")]);
        assert_eq!(client_id(&req), "192.168.1.1");
    }

    #[test]
    fn test_empty_headers_are_skipped() {
        let req = request(&[
            ("cf-connecting-ip", " "),
            ("x-forwarded-for", ", 10.0.0.9"),
            ("x-real-ip", "192.168.1.1"),
        ]);
        assert_eq!(client_id(&req), "192.168.1.1");
    }

    #[test]
    fn test_unknown_is_borrowed() {
        let id = client_id(&request(&[]));
        assert_eq!(id, UNKNOWN_CLIENT);
        assert!(matches!(id, Cow::Borrowed(_)));
    }
}
