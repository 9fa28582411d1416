//! Metrics collection and exposition.
//!
//! # Metrics
//! - `edge_requests_total` (counter): requests by method, status
//! - `edge_request_duration_seconds` (histogram): latency distribution
//! - `edge_router_strategy_selected_total` (counter): strategy chosen by the smart router
//! - `edge_config_reloads_total` (counter): reload attempts by outcome
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; the Prometheus exporter is optional
//! - Labels stay low-cardinality (no paths)

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    ::metrics::counter!("edge_requests_total", &labels).increment(1);
    ::metrics::histogram!("edge_request_duration_seconds", &labels).record(started.elapsed().as_secs_f64());
}

pub fn record_strategy_selected(strategy: &'static str) {
    ::metrics::counter!("edge_router_strategy_selected_total", "strategy" => strategy).increment(1);
}

pub fn record_config_reload(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    ::metrics::counter!("edge_config_reloads_total", "outcome" => outcome).increment(1);
}
