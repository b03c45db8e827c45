//! Metrics collection and exposition.
//!
//! # Metrics
//! - `edge_requests_total` (counter): requests by route, method, status
//! - `edge_request_duration_seconds` (histogram): end-to-end latency by route
//! - `edge_forward_auth_total` (counter): forward auth outcomes
//! - `edge_route_builds_total` (counter): route handler builds by outcome
//! - `edge_resolver_cache_total` (counter): CNAME cache hits and misses
//! - `edge_task_panics_total` (counter): recovered background task panics
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library code and
//!   tests can call these helpers unconditionally

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a proxied request.
pub fn record_request(route: &str, method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    metrics::counter!(
        "edge_requests_total",
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!("edge_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a forward auth decision (`allow`, `deny`, `error`).
pub fn record_forward_auth(middleware: &str, outcome: &'static str) {
    metrics::counter!(
        "edge_forward_auth_total",
        "middleware" => middleware.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record the outcome of building one route (`ok`, `kept_previous`, `dropped`).
pub fn record_route_build(outcome: &'static str) {
    metrics::counter!("edge_route_builds_total", "outcome" => outcome).increment(1);
}

/// Record a CNAME cache lookup.
pub fn record_resolver_cache(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("edge_resolver_cache_total", "result" => result).increment(1);
}

/// Record a recovered panic in a background task.
pub fn record_task_panic() {
    metrics::counter!("edge_task_panics_total").increment(1);
}
