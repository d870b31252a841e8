//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define service metrics (requests, latency, panics, reloads, backends)
//! - Expose Prometheus-compatible metrics on the diagnostics port
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `http_panics_recovered_total` (counter): handler panics turned into 500s
//! - `config_reloads_total` (counter): reloads by result
//! - `backend_init_total` (counter): backend connects by kind, result
//! - `shutdown_hook_failures_total` (counter)
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed, so library users
//!   and tests pay nothing
//! - The exporter owns its own listener task for the process lifetime

use std::net::SocketAddr;
use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Diagnostics listener started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start diagnostics listener"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_panic() {
    metrics::counter!("http_panics_recovered_total").increment(1);
}

pub fn record_config_reload(success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("config_reloads_total", "result" => result).increment(1);
}

pub fn record_backend_init(kind: &'static str, success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("backend_init_total", "kind" => kind, "result" => result).increment(1);
}

pub fn record_shutdown_hook_failure() {
    metrics::counter!("shutdown_hook_failures_total").increment(1);
}

/// Middleware recording request count and latency.
pub async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let response = next.run(request).await;
    record_request(method.as_str(), response.status().as_u16(), start);
    response
}
