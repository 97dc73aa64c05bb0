//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shield_requests_total` (counter): requests by route and status
//! - `shield_request_duration_seconds` (histogram): guard + handler latency by route
//! - `shield_rejections_total` (counter): guard rejections by reason
//! - `shield_blocks_total` (counter): temporary blocks issued
//! - `shield_tracked_clients` (gauge): client keys holding limiter state

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "shield_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("shield_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(reason: &'static str) {
    ::metrics::counter!("shield_rejections_total", "reason" => reason).increment(1);
}

pub fn record_block() {
    ::metrics::counter!("shield_blocks_total").increment(1);
}

pub fn record_tracked_clients(count: usize) {
    ::metrics::gauge!("shield_tracked_clients").set(count as f64);
}
