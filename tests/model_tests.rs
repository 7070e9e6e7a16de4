//! Unit tests for models and the stores through the public API.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use edge_proxy::ManualClock;

// Note: These tests can be run with: cargo test --test model_tests

mod api_model_tests {
    use super::*;
    use edge_proxy::models::{RssRequest, ValidateRequest, ValidationResponse};

    #[test]
    fn test_validation_response_is_camel_case() {
        let json = serde_json::to_value(ValidationResponse::valid("Valid URL")).unwrap();
        assert_eq!(json, json!({"isValid": true, "message": "Valid URL"}));
    }

    #[test]
    fn test_validate_request_accepts_loose_types() {
        let request: ValidateRequest =
            serde_json::from_value(json!({"type": ["url"], "value": null})).unwrap();
        assert!(request.kind.is_some());
        // JSON null is indistinguishable from an absent field
        assert!(request.value.is_none());
    }

    #[test]
    fn test_rss_request_ignores_unknown_fields() {
        let request: RssRequest =
            serde_json::from_value(json!({"url": "https://example.com", "extra": 1})).unwrap();
        assert_eq!(request.url.as_deref(), Some("https://example.com"));
    }
}

mod rate_limit_tests {
    use super::*;
    use edge_proxy::store::{LimiterSettings, RateDecision, SlidingWindowLimiter};

    fn limiter(limit: u32, clock: &Arc<ManualClock>) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(LimiterSettings::per_minute(limit).unwrap(), clock.clone())
    }

    #[test]
    fn test_window_never_exceeds_limit() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter(3, &clock);

        for second in 0..3 {
            clock.set(second * 1000);
            assert!(limiter.check("client").is_allowed());
        }

        clock.set(3000);
        assert!(matches!(
            limiter.check("client"),
            RateDecision::Limited { .. }
        ));

        clock.set(61_000);
        assert!(limiter.check("client").is_allowed());
    }

    #[test]
    fn test_steady_traffic_stays_within_any_window() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter(5, &clock);
        let mut accepted = Vec::new();

        // One request every 7 seconds for 10 minutes
        for step in 0..86u64 {
            let now = step * 7_000;
            clock.set(now);
            if limiter.check("steady").is_allowed() {
                accepted.push(now);
            }
        }

        for (i, start) in accepted.iter().enumerate() {
            let in_window = accepted
                .iter()
                .skip(i)
                .take_while(|t| **t < start + 60_000)
                .count();
            assert!(in_window <= 5, "window at {start} held {in_window}");
        }
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        assert!(LimiterSettings::per_minute(0).is_err());
    }
}

mod cache_tests {
    use super::*;
    use edge_proxy::store::ResponseCache;

    #[test]
    fn test_set_get_and_expire() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = ResponseCache::new(Duration::from_secs(300), clock.clone());

        cache.set("rss:https://example.com/", "payload", Duration::from_secs(300));
        clock.advance(Duration::from_millis(299_999));
        assert_eq!(cache.get("rss:https://example.com/"), Some("payload"));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("rss:https://example.com/"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_replaces_entry() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = ResponseCache::new(Duration::from_secs(60), clock.clone());

        cache.insert("k", 1);
        cache.insert("k", 2);
        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.len(), 1);
    }
}

mod token_tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use edge_proxy::security::TokenValidator;
    use edge_proxy::security::token::sign;

    const NOW: u64 = 1_700_000_000_000;

    fn validator(secret: &str) -> TokenValidator {
        TokenValidator::new(Some(secret), Arc::new(ManualClock::new(NOW)))
    }

    #[test]
    fn test_valid_token_accepted() {
        let v = validator("secret");
        let token = v.issue(NOW + 60_000).unwrap();
        assert!(v.validate(&token));
    }

    #[test]
    fn test_wrong_secret_always_rejected() {
        let token = validator("attacker").issue(NOW + 60_000).unwrap();
        assert!(!validator("secret").validate(&token));
    }

    #[test]
    fn test_past_expiry_rejected_with_good_signature() {
        let v = validator("secret");
        for exp in [0, NOW - 1, NOW] {
            assert!(!v.validate(&v.issue(exp).unwrap()), "exp={exp}");
        }
    }

    #[test]
    fn test_hand_built_token() {
        let payload = STANDARD.encode(json!({"exp": NOW + 1}).to_string());
        let signature = sign(b"secret", &payload).unwrap();
        assert!(validator("secret").validate(&format!("{payload}.{signature}")));

        let no_exp = STANDARD.encode(json!({"sub": "user"}).to_string());
        let signature = sign(b"secret", &no_exp).unwrap();
        assert!(!validator("secret").validate(&format!("{no_exp}.{signature}")));
    }

    #[test]
    fn test_garbage_never_panics() {
        let v = validator("secret");
        for token in ["", ".", "a.", ".b", "no-dot", "a.b.c", "💥.💥", "e30=.!!!"] {
            assert!(!v.validate(token), "{token:?}");
        }
    }
}

mod feed_tests {
    use edge_proxy::feed::{FeedFormat, FeedRejection, inspect};

    #[test]
    fn test_html_rejected_even_when_served_as_xml() {
        assert_eq!(
            inspect(b"<!DOCTYPE html><html><head></head></html>"),
            Err(FeedRejection::Html)
        );
    }

    #[test]
    fn test_bom_prefixed_feed_accepted() {
        let body = "\u{feff}<?xml version=\"1.0\"?><rss></rss>";
        assert_eq!(inspect(body.as_bytes()), Ok(FeedFormat::Rss));
    }
}
