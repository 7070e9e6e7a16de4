//! Trust boundary primitives: origin allow-list, signed tokens and the
//! response header set.
//!
//! All checks here are pure predicates. They never return errors; anything
//! unexpected collapses to "rejected".

pub mod headers;
pub mod origin;
pub mod token;

pub use headers::{
    API_KEY_HEADER, AUTH_TOKEN_HEADER, CACHE_STATUS_HEADER, PROXIED_URL_HEADER, SecurityHeaders,
};
pub use origin::OriginPolicy;
pub use token::TokenValidator;
