//! Fuzz testing for auth token validation.
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_token
//! ```
//!
//! Arbitrary tokens must be rejected without panicking, and a freshly
//! issued token must verify under the same secret and clock.

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use edge_proxy::ManualClock;
use edge_proxy::security::TokenValidator;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    secret: &'a str,
    token: &'a str,
    now: u64,
    ttl_ms: u32,
}

fuzz_target!(|input: Input<'_>| {
    let validator = TokenValidator::new(Some(input.secret), Arc::new(ManualClock::new(input.now)));
    let _ = validator.validate(input.token);

    // Expiry is compared as a JSON number; stay within exact f64 range
    let exp = input.now.saturating_add(u64::from(input.ttl_ms) + 1);
    if exp < 1 << 53 {
        if let Some(token) = validator.issue(exp) {
            assert!(validator.validate(&token));
        }
    }
});
