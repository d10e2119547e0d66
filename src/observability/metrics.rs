//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_upstream_health` (gauge): 1=healthy, 0=unhealthy, per upstream
//! - `proxy_upstream_load` (gauge): in-flight forwards, per upstream
//! - `proxy_dial_failures_total` (counter): failed upstream dials, per upstream
//! - `proxy_forwards_total` (counter): finished forwards by outcome
//! - `proxy_rate_limited_total` (counter): rejected admissions
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_upstream_health(upstream: &str, healthy: bool) {
    gauge!("proxy_upstream_health", "upstream" => upstream.to_string()).set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_upstream_load(upstream: &str, load: i64) {
    gauge!("proxy_upstream_load", "upstream" => upstream.to_string()).set(load as f64);
}

pub fn record_dial_failure(upstream: &str) {
    counter!("proxy_dial_failures_total", "upstream" => upstream.to_string()).increment(1);
}

/// `outcome` is one of `ok`, `copy_error`, `no_upstream`, `nil_stream`.
pub fn record_forward(outcome: &'static str) {
    counter!("proxy_forwards_total", "outcome" => outcome).increment(1);
}

pub fn record_rate_limited() {
    counter!("proxy_rate_limited_total").increment(1);
}
