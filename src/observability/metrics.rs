//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define client metrics (requests, latency, connection state, retries)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `push_requests_total` (counter): completed requests by status
//! - `push_request_duration_seconds` (histogram): post-to-response latency
//! - `push_connection_state` (gauge): 0=disconnected, 1=connecting, 2=connected
//! - `push_connect_attempts_total` (counter): connect attempts by outcome
//! - `push_heartbeat_failures_total` (counter): missed heartbeat replies
//! - `push_requests_discarded_total` (counter): requests dropped on teardown
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Labels carry the connection id so pooled connections stay distinct

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_response(status: &str, elapsed: Duration) {
    counter!("push_requests_total", "status" => status.to_string()).increment(1);
    histogram!("push_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_connection_state(connection: &str, state: u8) {
    gauge!("push_connection_state", "connection" => connection.to_string()).set(f64::from(state));
}

pub fn record_connect_attempt(outcome: &'static str) {
    counter!("push_connect_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_heartbeat_failure() {
    counter!("push_heartbeat_failures_total").increment(1);
}

pub fn record_discarded(count: usize) {
    if count > 0 {
        counter!("push_requests_discarded_total").increment(count as u64);
    }
}
