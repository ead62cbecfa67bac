//! Metrics collection and exposition.
//!
//! # Metrics
//! - `simhost_requests_total` (counter): requests by protocol family, status
//! - `simhost_request_duration_seconds` (histogram): latency by protocol family
//! - `simhost_poll_requests_total` (counter): poll outcomes (events, timeout, cancelled)
//! - `simhost_module_events_total` (counter): module lifecycle events
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter serves its own HTTP listener

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::routing::router::Protocol;

/// Install the Prometheus recorder and start its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

/// Record one finished request.
pub fn record_request(protocol: Protocol, status: u16, started: Instant) {
    ::metrics::counter!(
        "simhost_requests_total",
        "protocol" => protocol.as_str(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("simhost_request_duration_seconds", "protocol" => protocol.as_str())
        .record(started.elapsed().as_secs_f64());
}

/// Record how a poll request finished.
pub fn record_poll(outcome: &'static str) {
    ::metrics::counter!("simhost_poll_requests_total", "outcome" => outcome).increment(1);
}

/// Record a module lifecycle event (attached, skipped, failed, closed...).
pub fn record_module_event(event: &'static str) {
    ::metrics::counter!("simhost_module_events_total", "event" => event).increment(1);
}
