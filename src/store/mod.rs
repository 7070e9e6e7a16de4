//! In-memory shared state: rate-limit buckets and the response cache.
//!
//! Both stores are explicit objects owned by [`crate::AppState`], never
//! module-level statics, so each test gets an isolated instance.

pub mod cache;
pub mod rate_limit;

pub use cache::ResponseCache;
pub use rate_limit::{
    LimiterSettings, RateDecision, RateLimitError, SlidingWindowLimiter,
};
