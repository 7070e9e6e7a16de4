//! HTTP middleware for the proxy's trust boundary.
//!
//! # Architecture
//!
//! ```text
//! Request → Headers/Preflight → Catch Panic → Request ID + Trace → Guard → Auth → Rate Limiter → Router
//!                ↓                   ↓                                ↓       ↓          ↓
//!           204 OPTIONS         500 envelope                     413 / 403  401/429    429
//! ```
//!
//! The header layer wraps everything else, so CORS and security headers are
//! present on every response, including rejections and rendered panics.

pub mod auth;
pub mod cors;
pub mod guard;
pub mod ip;
pub mod rate_limit;

pub use auth::TokenAuthLayer;
pub use cors::SecurityHeadersLayer;
pub use guard::RequestGuardLayer;
pub use ip::{UNKNOWN_CLIENT, client_id};
pub use rate_limit::RateLimitLayer;
