//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): inbound requests by route, status
//! - `gateway_request_duration_seconds` (histogram): inbound latency
//! - `gateway_probes_total` (counter): health probes by service, result
//! - `gateway_probe_duration_seconds` (histogram): probe latency
//! - `gateway_backend_health` (gauge): 2=online, 1=degraded, 0=offline
//! - `gateway_dispatch_total` (counter): dispatches by outcome
//! - `gateway_dispatch_attempts_total` (counter): backend attempts
//! - `gateway_dispatch_duration_seconds` (histogram)
//! - `gateway_fanout_total` (counter): fan-outs by result
//! - `gateway_fanout_timed_out_total` (counter): abandoned candidates
//! - `gateway_rate_limited_total` (counter): rejections by route
//! - `gateway_rate_buckets` (gauge): live buckets

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::health::state::HealthStatus;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_probe(service: &str, success: bool, latency: Duration) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!(
        "gateway_probes_total",
        "service" => service.to_string(),
        "result" => result
    )
    .increment(1);
    metrics::histogram!("gateway_probe_duration_seconds", "service" => service.to_string())
        .record(latency.as_secs_f64());
}

pub fn record_backend_health(service: &str, status: HealthStatus) {
    let value = match status {
        HealthStatus::Online => 2.0,
        HealthStatus::Degraded => 1.0,
        HealthStatus::Offline => 0.0,
    };
    metrics::gauge!("gateway_backend_health", "service" => service.to_string()).set(value);
}

pub fn record_dispatch(outcome: &'static str, attempts: u32, latency: Duration) {
    metrics::counter!("gateway_dispatch_total", "outcome" => outcome).increment(1);
    metrics::counter!("gateway_dispatch_attempts_total").increment(u64::from(attempts));
    metrics::histogram!("gateway_dispatch_duration_seconds", "outcome" => outcome)
        .record(latency.as_secs_f64());
}

pub fn record_fanout(result: &'static str, candidates: usize, timed_out: usize) {
    metrics::counter!("gateway_fanout_total", "result" => result).increment(1);
    metrics::histogram!("gateway_fanout_candidates").record(candidates as f64);
    if timed_out > 0 {
        metrics::counter!("gateway_fanout_timed_out_total").increment(timed_out as u64);
    }
}

pub fn record_rate_limited(route: &str) {
    metrics::counter!("gateway_rate_limited_total", "route" => route.to_string()).increment(1);
}

pub fn record_rate_buckets(count: usize) {
    metrics::gauge!("gateway_rate_buckets").set(count as f64);
}
