//! Input validation endpoint.
//!
//! `POST {"type": "url" | "rss" | "api_key", "value": "..."}` answers
//! `200 {"isValid": bool, "message": string}`. Only malformed JSON is an
//! error; every other problem is reported as `isValid: false`.

use axum::Json;
use axum::extract::Request;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::instrument;

use super::util::{parse_json, read_body, require_method};
use crate::error::ProxyResult;
use crate::models::ValidateRequest;
use crate::validation;

#[instrument(skip(req))]
pub async fn handle(req: Request, max_body_size: usize) -> ProxyResult<Response> {
    require_method(req.method(), &[Method::POST], "POST")?;

    let body = read_body(req, max_body_size).await?;
    let request: ValidateRequest = parse_json(&body)?;

    let result = validation::validate(
        request.kind.as_ref().and_then(Value::as_str),
        request.value.as_ref(),
    );

    Ok(Json(result).into_response())
}
