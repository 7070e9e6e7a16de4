//! Stateless signed auth tokens.
//!
//! # Format
//!
//! ```text
//! <payload>.<signature>
//! payload   = base64(JSON { "exp": <expiry, ms since Unix epoch>, ... })
//! signature = base64(HMAC-SHA256(secret, payload))
//! ```
//!
//! The HMAC is computed over the payload text exactly as it appears in the
//! token. A token is valid only if the signature verifies and `exp` lies in
//! the future. Nothing is stored server-side.
//!
//! # Failure Semantics
//!
//! [`TokenValidator::validate`] is a pure predicate: malformed input, bad
//! base64, bad JSON and a missing secret all collapse to `false`.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::debug;

use crate::clock::SharedClock;

type HmacSha256 = Hmac<Sha256>;

/// Claims read from the token payload.
#[derive(Debug, Deserialize)]
struct TokenClaims {
    exp: Option<f64>,
}

/// Verifies (and can mint) tokens signed with the server secret.
#[derive(Clone)]
pub struct TokenValidator {
    secret: Option<Arc<[u8]>>,
    clock: SharedClock,
}

impl fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenValidator")
            .field("secret_configured", &self.secret.is_some())
            .finish_non_exhaustive()
    }
}

impl TokenValidator {
    /// Create a validator. With `secret = None` every token is rejected.
    pub fn new(secret: Option<&str>, clock: SharedClock) -> Self {
        Self {
            secret: secret
                .filter(|s| !s.is_empty())
                .map(|s| Arc::from(s.as_bytes())),
            clock,
        }
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Check signature and expiry of `token`.
    pub fn validate(&self, token: &str) -> bool {
        let Some(secret) = self.secret.as_deref() else {
            debug!("Rejecting token: no auth secret configured");
            return false;
        };

        let Some((payload, signature)) = token.trim().rsplit_once('.') else {
            return false;
        };
        if payload.is_empty() || signature.is_empty() {
            return false;
        }

        let Some(signature) = decode_base64(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
            return false;
        };
        mac.update(payload.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            debug!("Rejecting token: signature mismatch");
            return false;
        }

        let Some(claims) = decode_base64(payload)
            .and_then(|raw| serde_json::from_slice::<TokenClaims>(&raw).ok())
        else {
            return false;
        };

        #[allow(clippy::cast_precision_loss)]
        let now = self.clock.now_millis() as f64;
        claims.exp.is_some_and(|exp| exp > now)
    }

    /// Mint a token expiring at `expires_at_ms`. `None` without a secret.
    pub fn issue(&self, expires_at_ms: u64) -> Option<String> {
        let secret = self.secret.as_deref()?;
        let payload = STANDARD.encode(json!({ "exp": expires_at_ms }).to_string());
        let signature = sign(secret, &payload)?;
        Some(format!("{payload}.{signature}"))
    }
}

/// Base64 HMAC-SHA256 of `payload` under `secret`.
pub fn sign(secret: &[u8], payload: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Decode standard base64, falling back to the URL-safe unpadded alphabet.
fn decode_base64(input: &str) -> Option<Vec<u8>> {
    STANDARD
        .decode(input)
        .or_else(|_| URL_SAFE_NO_PAD.decode(input))
        .ok()
}
