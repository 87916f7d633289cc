//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, route
//! - `proxy_request_duration_seconds` (histogram): latency by route
//! - `proxy_upstream_errors_total` (counter): failed origin fetches by kind
//! - `proxy_rewrites_total` (counter): rewrite passes by content and outcome
//! - `proxy_reference_errors_total` (counter): references left unrewritten
//! - `proxy_sessions_active` (gauge): live sessions
//! - `proxy_sessions_evicted_total` (counter): removed sessions by reason

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route: &'static str, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(kind: &'static str) {
    metrics::counter!("proxy_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_rewrite(content: &'static str, outcome: &'static str) {
    metrics::counter!("proxy_rewrites_total", "content" => content, "outcome" => outcome)
        .increment(1);
}

pub fn record_reference_error(source: &str) {
    metrics::counter!("proxy_reference_errors_total", "source" => source.to_string())
        .increment(1);
}

pub fn record_sessions_active(count: usize) {
    metrics::gauge!("proxy_sessions_active").set(count as f64);
}

pub fn record_session_evicted(reason: &'static str) {
    metrics::counter!("proxy_sessions_evicted_total", "reason" => reason).increment(1);
}
