//! Metrics collection and exposition.
//!
//! # Metrics
//! - `resilience_bulkhead_requests_total` (counter): admissions by service, outcome
//! - `resilience_bulkhead_wait_seconds` (histogram): slot wait time
//! - `resilience_bulkhead_process_seconds` (histogram): processor time by result
//! - `resilience_bulkhead_active` (gauge): slots currently held
//! - `resilience_fallback_total` (counter): dispatches by service, type, outcome
//! - `resilience_provider_requests_total` (counter): provider calls by outcome
//! - `resilience_provider_retries_total` (counter): retried attempts
//! - `resilience_provider_latency_seconds` (histogram): per-attempt latency
//! - `resilience_provider_health` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so library users and tests pay nothing
//! - Labels are service/provider names and small fixed outcome sets

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// `outcome` is one of `admitted`, `queued`, `rejected`, `timeout`, `cancelled`.
pub fn record_bulkhead_admission(service: &str, outcome: &'static str) {
    counter!(
        "resilience_bulkhead_requests_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_bulkhead_active(service: &str, active: usize) {
    gauge!("resilience_bulkhead_active", "service" => service.to_string()).set(active as f64);
}

pub fn record_bulkhead_wait(service: &str, waited: Duration) {
    histogram!("resilience_bulkhead_wait_seconds", "service" => service.to_string())
        .record(waited.as_secs_f64());
}

pub fn record_bulkhead_process(service: &str, elapsed: Duration, failed: bool) {
    let result = if failed { "error" } else { "ok" };
    histogram!(
        "resilience_bulkhead_process_seconds",
        "service" => service.to_string(),
        "result" => result
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_fallback(service: &str, fallback_type: &'static str, outcome: &'static str) {
    counter!(
        "resilience_fallback_total",
        "service" => service.to_string(),
        "type" => fallback_type,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_provider_request(provider: &str, outcome: &'static str) {
    counter!(
        "resilience_provider_requests_total",
        "provider" => provider.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_provider_retry(provider: &str) {
    counter!("resilience_provider_retries_total", "provider" => provider.to_string()).increment(1);
}

pub fn record_provider_latency(provider: &str, latency: Duration) {
    histogram!("resilience_provider_latency_seconds", "provider" => provider.to_string())
        .record(latency.as_secs_f64());
}

pub fn record_provider_health(provider: &str, healthy: bool) {
    gauge!("resilience_provider_health", "provider" => provider.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
