//! Prometheus metrics for the proxy.
//!
//! Metrics are exposed by a dedicated listener (default `0.0.0.0:9090`).
//! Recording functions are no-ops until [`init_metrics`] installs the exporter.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `edge_proxy_requests_total` - Requests by route and status
//! - `edge_proxy_rate_limited_total` - Requests rejected by the sliding-window limiter
//! - `edge_proxy_auth_failures_total` - Rejected tokens (labels: reason)
//! - `edge_proxy_cache_lookups_total` - Feed cache lookups (labels: result = hit/miss)
//! - `edge_proxy_upstream_errors_total` - Upstream failures (labels: upstream, kind)
//!
//! ## Histograms
//! - `edge_proxy_upstream_duration_seconds` - Upstream call latency (labels: upstream)
//!
//! ## Gauges
//! - `edge_proxy_rate_limit_clients` - Tracked rate-limit buckets
//! - `edge_proxy_cache_entries` - Entries in the feed cache

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "edge_proxy_requests_total";
    pub const RATE_LIMITED_TOTAL: &str = "edge_proxy_rate_limited_total";
    pub const AUTH_FAILURES_TOTAL: &str = "edge_proxy_auth_failures_total";
    pub const CACHE_LOOKUPS_TOTAL: &str = "edge_proxy_cache_lookups_total";
    pub const UPSTREAM_ERRORS_TOTAL: &str = "edge_proxy_upstream_errors_total";
    pub const UPSTREAM_DURATION_SECONDS: &str = "edge_proxy_upstream_duration_seconds";
    pub const RATE_LIMIT_CLIENTS: &str = "edge_proxy_rate_limit_clients";
    pub const CACHE_ENTRIES: &str = "edge_proxy_cache_entries";
}

/// Install the Prometheus exporter and describe all metrics.
///
/// # Errors
///
/// Returns a message if the exporter cannot bind or is already installed.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(names::REQUESTS_TOTAL, "Total requests handled by route");
    describe_counter!(
        names::RATE_LIMITED_TOTAL,
        "Requests rejected by the per-client sliding window"
    );
    describe_counter!(names::AUTH_FAILURES_TOTAL, "Rejected auth tokens");
    describe_counter!(names::CACHE_LOOKUPS_TOTAL, "Feed cache lookups");
    describe_counter!(names::UPSTREAM_ERRORS_TOTAL, "Failed upstream calls");

    describe_histogram!(
        names::UPSTREAM_DURATION_SECONDS,
        "Upstream call duration in seconds"
    );

    describe_gauge!(names::RATE_LIMIT_CLIENTS, "Clients with a rate-limit bucket");
    describe_gauge!(names::CACHE_ENTRIES, "Entries held in the feed cache");

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counters
// =============================================================================

pub fn record_request(route: &'static str, status: u16) {
    counter!(names::REQUESTS_TOTAL, "route" => route, "status" => status.to_string())
        .increment(1);
}

pub fn record_rate_limited() {
    counter!(names::RATE_LIMITED_TOTAL).increment(1);
}

/// Record a rejected token. `reason` is `missing`, `invalid` or `blocked`.
pub fn record_auth_failure(reason: &'static str) {
    counter!(names::AUTH_FAILURES_TOTAL, "reason" => reason).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(names::CACHE_LOOKUPS_TOTAL, "result" => result).increment(1);
}

pub fn record_upstream_error(upstream: &'static str, kind: &'static str) {
    counter!(names::UPSTREAM_ERRORS_TOTAL, "upstream" => upstream, "kind" => kind).increment(1);
}

// =============================================================================
// Histograms
// =============================================================================

pub fn record_upstream_duration(upstream: &'static str, duration_secs: f64) {
    histogram!(names::UPSTREAM_DURATION_SECONDS, "upstream" => upstream).record(duration_secs);
}

// =============================================================================
// Gauges
// =============================================================================

#[allow(clippy::cast_precision_loss)]
pub fn set_store_sizes(rate_limit_clients: usize, cache_entries: usize) {
    gauge!(names::RATE_LIMIT_CLIENTS).set(rate_limit_clients as f64);
    gauge!(names::CACHE_ENTRIES).set(cache_entries as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed exporter must be a silent no-op.

    #[test]
    fn test_record_counters() {
        record_request("rss", 200);
        record_rate_limited();
        record_auth_failure("invalid");
        record_cache_lookup(true);
        record_upstream_error("feed", "timeout");
    }

    #[test]
    fn test_record_histogram_and_gauges() {
        record_upstream_duration("llm", 0.25);
        set_store_sizes(3, 7);
    }
}
