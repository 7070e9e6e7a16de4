mod api;

pub use api::{CachedFeed, RssQuery, RssRequest, ValidateRequest, ValidationResponse};
