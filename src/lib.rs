//! # Edge Proxy
//!
//! A secure HTTP edge proxy built on Axum, featuring:
//!
//! - **RSS fetching**: feed URLs fetched, sniffed and cached for a short TTL
//! - **LLM forwarding**: caller credentials moved from the body into an
//!   upstream header, responses relayed verbatim
//! - **Input validation**: URL and API-key format checks
//! - **Security**: signed expiring tokens, origin allow-list, per-client
//!   sliding-window rate limiting, CORS and security headers on every response
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Headers → Panic → Request ID → Guard → Auth    │
//! │              → Rate Limit)                                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Dispatch (route table) → Handlers (rss, llm, validate)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Stores (rate-limit buckets, feed cache) + UpstreamClient   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edge_proxy::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config)?;
//!     state.spawn_background_tasks();
//!
//!     let app = build_router(state);
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Security Configuration
//!
//! ```bash
//! AUTH_SECRET=change-me ALLOWED_ORIGINS=https://app.example.com cargo run
//! ```
//!
//! Local development without tokens or origin checks:
//! ```bash
//! REQUIRE_AUTH=false ENFORCE_ORIGIN=false cargo run
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod security;
pub mod state;
pub mod store;
pub mod upstream;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::Config;
pub use error::{ProxyError, ProxyResult};
pub use routes::build_router;
pub use state::AppState;
