//! Proxy configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! Everything comes from environment variables with defaults suited to local
//! development. A `.env` file is loaded first when present.
//!
//! # Security Configuration
//!
//! - `AUTH_SECRET`: HMAC secret for `X-Auth-Token`. Unset means every token is rejected.
//! - `REQUIRE_AUTH`: set to `false` to serve without token checks (default: `true`)
//! - `ALLOWED_ORIGINS`: comma-separated origin prefixes, `*` for any
//! - `ENFORCE_ORIGIN`: set to `false` to skip the 403 origin check (default: `true`)
//!
//! # Limits
//!
//! - `RATE_LIMIT_PER_MINUTE`: sliding-window ceiling per client (default: 60, 0 = off)
//! - `MAX_REQUEST_SIZE`: request body limit in bytes (default: 100KB)
//! - `CACHE_TTL_SECS`: feed cache lifetime (default: 300)

use std::env;
use std::time::Duration;

use crate::error::{ProxyError, ProxyResult};

/// Default route table entries.
pub const DEFAULT_RSS_PATHS: &[&str] = &["/", "/rss", "/fetch-rss", "/api/rss"];
pub const DEFAULT_LLM_PATHS: &[&str] = &["/claude", "/llm", "/api/claude"];
pub const DEFAULT_VALIDATE_PATHS: &[&str] = &["/validate", "/api/validate"];

pub const DEFAULT_LLM_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_LLM_API_VERSION: &str = "2023-06-01";

/// User agent sent on feed fetches unless `FEED_USER_AGENT` overrides it.
pub fn default_feed_user_agent() -> String {
    format!("EdgeProxy-RSS-Reader/{}", env!("CARGO_PKG_VERSION"))
}

/// Proxy configuration.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Proxy will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8787)
    pub port: u16,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Origin prefixes allowed to call the proxy. `*` allows any origin.
    pub allowed_origins: Vec<String>,

    /// Reject requests whose origin is not allowed (403)
    pub enforce_origin: bool,

    /// HMAC-SHA256 secret for auth tokens
    pub auth_secret: Option<String>,

    /// Require a valid `X-Auth-Token` on every non-preflight request
    pub require_auth: bool,

    /// Failed auth attempts tolerated per client per minute before 429
    pub auth_failure_limit_per_minute: u32,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Requests per trailing 60s window per client (0 = disabled)
    pub rate_limit_per_minute: u32,

    /// Tracked client count above which idle buckets are swept
    pub rate_limit_max_clients: usize,

    /// Idle time after which a bucket counts as stale
    pub rate_limit_stale_after: Duration,

    /// Maximum request body size in bytes
    pub max_request_size: usize,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Lifetime of cached feed responses
    pub cache_ttl: Duration,

    /// Interval of the background expired-entry purge
    pub cache_sweep_interval: Duration,

    // =========================================================================
    // Upstream Configuration
    // =========================================================================
    /// Timeout applied to every outbound request
    pub upstream_timeout: Duration,

    /// User agent for feed fetches
    pub feed_user_agent: String,

    /// LLM messages endpoint
    pub llm_api_url: String,

    /// Value of the `anthropic-version` header sent upstream
    pub llm_api_version: String,

    // =========================================================================
    // Routing Configuration
    // =========================================================================
    pub rss_paths: Vec<String>,
    pub llm_paths: Vec<String>,
    pub validate_paths: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` if a value fails to parse or the
    /// combination is inconsistent.
    pub fn from_env() -> ProxyResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 8787)?,

            // Security
            allowed_origins: Self::parse_list(
                "ALLOWED_ORIGINS",
                &["http://localhost", "http://127.0.0.1"],
            ),
            enforce_origin: Self::parse_flag("ENFORCE_ORIGIN", true)?,
            auth_secret: env::var("AUTH_SECRET").ok().filter(|s| !s.is_empty()),
            require_auth: Self::parse_flag("REQUIRE_AUTH", true)?,
            auth_failure_limit_per_minute: Self::parse_env("AUTH_FAILURE_LIMIT_PER_MINUTE", 10)?,

            // Rate limiting
            rate_limit_per_minute: Self::parse_env("RATE_LIMIT_PER_MINUTE", 60)?,
            rate_limit_max_clients: Self::parse_env("RATE_LIMIT_MAX_CLIENTS", 1000)?,
            rate_limit_stale_after: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_STALE_SECS",
                300,
            )?),
            max_request_size: Self::parse_env("MAX_REQUEST_SIZE", 100 * 1024)?,

            // Cache
            cache_ttl: Duration::from_secs(Self::parse_env("CACHE_TTL_SECS", 300)?),
            cache_sweep_interval: Duration::from_secs(Self::parse_env(
                "CACHE_SWEEP_INTERVAL_SECS",
                60,
            )?),

            // Upstream
            upstream_timeout: Duration::from_secs(Self::parse_env("UPSTREAM_TIMEOUT_SECS", 10)?),
            feed_user_agent: env::var("FEED_USER_AGENT")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(default_feed_user_agent),
            llm_api_url: env::var("LLM_API_URL")
                .unwrap_or_else(|_| DEFAULT_LLM_API_URL.to_string()),
            llm_api_version: env::var("LLM_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_LLM_API_VERSION.to_string()),

            // Routing
            rss_paths: Self::parse_paths("RSS_PATHS", DEFAULT_RSS_PATHS),
            llm_paths: Self::parse_paths("LLM_PATHS", DEFAULT_LLM_PATHS),
            validate_paths: Self::parse_paths("VALIDATE_PATHS", DEFAULT_VALIDATE_PATHS),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` if validation fails.
    pub fn validate(&self) -> ProxyResult<()> {
        if self.max_request_size == 0 {
            return Err(ProxyError::Config(
                "MAX_REQUEST_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.cache_ttl.is_zero() {
            return Err(ProxyError::Config(
                "CACHE_TTL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.cache_sweep_interval.is_zero() {
            return Err(ProxyError::Config(
                "CACHE_SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.upstream_timeout.is_zero() {
            return Err(ProxyError::Config(
                "UPSTREAM_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.require_auth && self.auth_failure_limit_per_minute == 0 {
            return Err(ProxyError::Config(
                "AUTH_FAILURE_LIMIT_PER_MINUTE must be greater than 0".to_string(),
            ));
        }

        if url::Url::parse(&self.llm_api_url).is_err() {
            return Err(ProxyError::Config(format!(
                "LLM_API_URL is not a valid URL: {}",
                self.llm_api_url
            )));
        }

        // A path may belong to only one handler
        let mut seen = std::collections::HashSet::new();
        for path in self
            .rss_paths
            .iter()
            .chain(&self.llm_paths)
            .chain(&self.validate_paths)
        {
            if !seen.insert(path.as_str()) {
                return Err(ProxyError::Config(format!(
                    "Path {path} is mapped to more than one handler"
                )));
            }
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_per_minute > 0
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        self.metrics_enabled()
            .then(|| std::net::SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> ProxyResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| ProxyError::Config(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a boolean flag. Accepts `true/false`, `1/0`, `yes/no`.
    fn parse_flag(name: &str, default: bool) -> ProxyResult<bool> {
        match env::var(name) {
            Ok(val) => parse_bool(&val)
                .ok_or_else(|| ProxyError::Config(format!("Invalid {name}: expected a boolean"))),
            Err(_) => Ok(default),
        }
    }

    fn parse_list(name: &str, default: &[&str]) -> Vec<String> {
        match env::var(name) {
            Ok(val) => split_list(&val),
            Err(_) => default.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Route paths must be absolute; anything else is dropped.
    fn parse_paths(name: &str, default: &[&str]) -> Vec<String> {
        Self::parse_list(name, default)
            .into_iter()
            .filter(|p| p.starts_with('/'))
            .collect()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        let paths = |p: &[&str]| p.iter().map(|s| (*s).to_string()).collect();
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 8787,
            // Security
            allowed_origins: vec![
                "http://localhost".to_string(),
                "http://127.0.0.1".to_string(),
            ],
            enforce_origin: true,
            auth_secret: None,
            require_auth: true,
            auth_failure_limit_per_minute: 10,
            // Rate limiting
            rate_limit_per_minute: 60,
            rate_limit_max_clients: 1000,
            rate_limit_stale_after: Duration::from_secs(300),
            max_request_size: 100 * 1024,
            // Cache
            cache_ttl: Duration::from_secs(300),
            cache_sweep_interval: Duration::from_secs(60),
            // Upstream
            upstream_timeout: Duration::from_secs(10),
            feed_user_agent: default_feed_user_agent(),
            llm_api_url: DEFAULT_LLM_API_URL.to_string(),
            llm_api_version: DEFAULT_LLM_API_VERSION.to_string(),
            // Routing
            rss_paths: paths(DEFAULT_RSS_PATHS),
            llm_paths: paths(DEFAULT_LLM_PATHS),
            validate_paths: paths(DEFAULT_VALIDATE_PATHS),
            // Observability
            log_level: "info".to_string(),
            metrics_port: 9090,
        }
    }
}
