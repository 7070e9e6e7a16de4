//! LLM API forwarding handler.
//!
//! The caller's credential is lifted out of the JSON body (`apiKey` or
//! `api_key`) or taken from the `X-API-Key` header, then sent upstream only
//! as a header. The rest of the body is forwarded untouched and the
//! upstream answer is relayed verbatim.

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::util::{parse_json, read_body, require_method};
use crate::error::{ProxyError, ProxyResult};
use crate::security::API_KEY_HEADER;
use crate::state::AppState;

const CREDENTIAL_FIELDS: [&str; 2] = ["apiKey", "api_key"];
const DEFAULT_CONTENT_TYPE: &str = "application/json";

#[instrument(skip(state, req))]
pub async fn handle(state: &AppState, req: Request) -> ProxyResult<Response> {
    require_method(req.method(), &[Method::POST], "POST")?;

    let header_key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = read_body(req, state.config.max_request_size).await?;
    let Value::Object(mut payload) = parse_json::<Value>(&body)? else {
        return Err(ProxyError::BadRequest(
            "Request body must be a JSON object".to_string(),
        ));
    };

    let api_key = take_credential(&mut payload)
        .or(header_key)
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ProxyError::BadRequest("API key is required".to_string()))?;

    let forwarded = serde_json::to_vec(&payload)?;
    debug!(bytes = forwarded.len(), "Forwarding LLM request");

    let upstream = state.upstream.forward_llm(&api_key, forwarded).await?;

    let status = StatusCode::from_u16(upstream.status).map_err(|e| {
        ProxyError::Internal(format!("Upstream returned an invalid status: {e}"))
    })?;
    let content_type = upstream
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    Ok((status, [(CONTENT_TYPE, content_type)], Body::from(upstream.body)).into_response())
}

/// Remove every credential field from `payload`, returning the first string found.
fn take_credential(payload: &mut Map<String, Value>) -> Option<String> {
    let mut found = None;
    for field in CREDENTIAL_FIELDS {
        if let Some(Value::String(key)) = payload.remove(field) {
            found.get_or_insert(key);
        }
    }
    found
}
