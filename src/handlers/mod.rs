//! Request handlers, one module per [`Route`](crate::routes::Route).
//!
//! Handlers take the whole request because method checks happen inside
//! them, and return `ProxyResult<Response>`; the dispatcher turns errors
//! into envelopes.

pub mod llm;
pub mod rss;
mod util;
pub mod validate;
