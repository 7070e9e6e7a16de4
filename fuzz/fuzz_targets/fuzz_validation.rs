//! Fuzz testing for input validators and the feed sniffer.
//!
//! Every function exercised here must return a verdict for any input and
//! never panic.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the validation fuzz target
//! cargo +nightly fuzz run fuzz_validation
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `is_valid_url` / `parse_http_url`: URL parsing and scheme checks
//! - `is_valid_api_key_format`: credential shape check
//! - `validate`: the `/validate` endpoint logic for every kind
//! - `feed::inspect`: HTML / empty / format sniffing on raw bytes

#![no_main]

use edge_proxy::feed;
use edge_proxy::validation::{is_valid_api_key_format, is_valid_url, parse_http_url, validate};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Sniffing works on raw bytes, including invalid UTF-8
    let _ = feed::inspect(data);

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = is_valid_url(s);
        let _ = parse_http_url(s);
        let _ = is_valid_api_key_format(s);

        let value = serde_json::Value::String(s.to_string());
        for kind in ["url", "rss", "api_key", "apiKey", s] {
            let _ = validate(Some(kind), Some(&value));
        }
    }
});
