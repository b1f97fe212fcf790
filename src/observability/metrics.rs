//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): proxied requests by mode, status
//! - `proxy_request_duration_seconds` (histogram): latency by mode
//! - `proxy_upstream_errors_total` (counter): failed proxy requests by kind
//! - `proxy_playlist_rewrites_total` (counter): playlist outcomes
//!   (rewritten, failed, oversize)
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op, so tests and
//!   metrics-disabled deployments pay nothing
//! - Labels are low-cardinality; target hosts are never labels

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Serve Prometheus metrics on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(mode: &'static str, status: u16, started: Instant) {
    counter!("proxy_requests_total", "mode" => mode, "status" => status.to_string()).increment(1);
    histogram!("proxy_request_duration_seconds", "mode" => mode)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_upstream_error(kind: &'static str) {
    counter!("proxy_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_rewrite(outcome: &'static str) {
    counter!("proxy_playlist_rewrites_total", "outcome" => outcome).increment(1);
}
