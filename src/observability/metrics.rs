//! Metrics collection and exposition.
//!
//! # Metrics
//! - `broker_connections_accepted_total` (counter)
//! - `broker_connections_closed_total` (counter)
//! - `broker_accept_errors_total` (counter): by kind (temporary, other)
//! - `broker_active_connections` (gauge): registry size
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_accepted() {
    counter!("broker_connections_accepted_total").increment(1);
}

pub fn record_connection_closed() {
    counter!("broker_connections_closed_total").increment(1);
}

pub fn record_accept_error(kind: &'static str) {
    counter!("broker_accept_errors_total", "kind" => kind).increment(1);
}

pub fn set_active_connections(count: usize) {
    gauge!("broker_active_connections").set(count as f64);
}
