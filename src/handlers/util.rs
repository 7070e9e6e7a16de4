//! Shared utilities for handlers.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{ProxyError, ProxyResult};

/// Reject any method not in `allowed`.
///
/// `allow` is the value of the `Allow` header on the 405 response.
pub fn require_method(
    method: &Method,
    allowed: &[Method],
    allow: &'static str,
) -> ProxyResult<()> {
    if allowed.contains(method) {
        Ok(())
    } else {
        Err(ProxyError::MethodNotAllowed {
            method: method.to_string(),
            allowed: allow,
        })
    }
}

/// Read the whole request body, bounded by the router's body limit.
///
/// Bodies without a declared length are capped here as well; exceeding the
/// limit yields `PayloadTooLarge`.
pub async fn read_body(req: Request, limit: usize) -> ProxyResult<Bytes> {
    Bytes::from_request(req, &()).await.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ProxyError::PayloadTooLarge { limit }
        } else {
            warn!(error = %rejection.body_text(), "Failed to read request body");
            ProxyError::BadRequest("Failed to read request body".to_string())
        }
    })
}

/// Parse a JSON body. An empty body is treated as `{}`.
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> ProxyResult<T> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::DefaultBodyLimit;
    use axum::http::header::ALLOW;
    use axum::response::IntoResponse;
    use tower::{Layer, ServiceExt};

    #[test]
    fn test_require_method() {
        assert!(require_method(&Method::POST, &[Method::POST], "POST").is_ok());

        let err = require_method(&Method::PUT, &[Method::GET, Method::POST], "GET, POST")
            .unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, POST");
    }

    #[test]
    fn test_parse_json_empty_body_is_empty_object() {
        let value: serde_json::Value = parse_json(b"  ").unwrap();
        assert!(value.as_object().is_some_and(serde_json::Map::is_empty));
    }

    #[test]
    fn test_parse_json_malformed() {
        let err = parse_json::<serde_json::Value>(b"{oops").unwrap_err();
        assert!(matches!(err, ProxyError::InvalidJson(_)));
    }

    #[tokio::test]
    async fn test_read_body_enforces_limit() {
        let service = DefaultBodyLimit::max(10).layer(tower::service_fn(|req: Request| async move {
            Ok::<_, std::convert::Infallible>(read_body(req, 10).await)
        }));

        // Built without a content-length header
        let req = Request::builder().body(Body::from(vec![b'a'; 20])).unwrap();
        let result = service.clone().oneshot(req).await.unwrap();
        assert!(matches!(result, Err(ProxyError::PayloadTooLarge { limit: 10 })));

        let req = Request::builder().body(Body::from("small")).unwrap();
        let body = service.oneshot(req).await.unwrap().unwrap();
        assert_eq!(&body[..], b"small");
    }
}
