//! Metrics collection and exposition.
//!
//! # Metrics
//! - `db_proxy_connection_ready` (gauge): 1=ready, 0=not ready, by role and address
//! - `db_proxy_healthy_replicas` (gauge): replicas that passed the last tick
//! - `db_proxy_routed_total` (counter): reads and writes by target role
//! - `db_proxy_health_ticks_total` (counter): completed health-check passes

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::load_balancer::Role;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_ready(role: Role, address: &str, ready: bool) {
    metrics::gauge!(
        "db_proxy_connection_ready",
        "role" => role.to_string(),
        "address" => address.to_string()
    )
    .set(if ready { 1.0 } else { 0.0 });
}

pub fn record_healthy_replicas(healthy: usize) {
    metrics::gauge!("db_proxy_healthy_replicas").set(healthy as f64);
    metrics::counter!("db_proxy_health_ticks_total").increment(1);
}

pub fn record_routed(target: Role) {
    metrics::counter!("db_proxy_routed_total", "target" => target.to_string()).increment(1);
}
