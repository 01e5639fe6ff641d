//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, mode
//! - `proxy_request_duration_seconds` (histogram): latency by mode
//! - `proxy_upstream_errors_total` (counter): upstream failures by kind
//! - `proxy_playback_total` (counter): playback lookups by result (hit/miss)
//! - `proxy_recordings_total` (counter): recording attempts by result (ok/error)
//!
//! Recording a metric with no exporter installed is a no-op.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one completed proxy request.
pub fn record_request(method: &str, status: u16, mode: &'static str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "mode" => mode,
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "mode" => mode)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(kind: &'static str) {
    counter!("proxy_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_playback(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("proxy_playback_total", "result" => result).increment(1);
}

pub fn record_recording(ok: bool) {
    let result = if ok { "ok" } else { "error" };
    counter!("proxy_recordings_total", "result" => result).increment(1);
}
