use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query string of `GET /rss?url=...`.
#[derive(Debug, Default, Deserialize)]
pub struct RssQuery {
    pub url: Option<String>,
}

/// JSON body of `POST /rss`.
#[derive(Debug, Default, Deserialize)]
pub struct RssRequest {
    /// Feed URL to fetch (http/https only)
    #[serde(default)]
    pub url: Option<String>,
}

/// JSON body of `POST /validate`.
///
/// Both fields stay loosely typed so that a wrong type yields
/// `isValid: false` instead of a 400.
#[derive(Debug, Default, Deserialize)]
pub struct ValidateRequest {
    #[serde(default, rename = "type")]
    pub kind: Option<Value>,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Result of `POST /validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponse {
    pub is_valid: bool,
    pub message: String,
}

impl ValidationResponse {
    pub fn valid(message: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
        }
    }
}

/// A fetched feed as stored in the response cache.
#[derive(Debug, Clone)]
pub struct CachedFeed {
    pub body: Bytes,
    pub content_type: String,
}
