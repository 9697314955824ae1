//! Metrics collection and exposition.
//!
//! # Metrics
//! - `donations_total` (counter): finished donation flows by network, outcome
//! - `confirmation_polls_total` (counter): status polls by network, result
//! - `confirmation_wait_seconds` (histogram): submit-to-terminal latency
//! - `ledger_writes_total` (counter): ledger upserts by status, result
//! - `refunds_total` (counter): refund attempts by mode, result
//! - `chain_rpc_healthy` (gauge): 1=healthy, 0=unhealthy per network
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter, so
//! library code and tests can call these freely.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Start the Prometheus scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_donation(network: &str, outcome: &'static str) {
    metrics::counter!("donations_total", "network" => network.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_confirmation_poll(network: &str, result: &'static str) {
    metrics::counter!("confirmation_polls_total", "network" => network.to_string(), "result" => result)
        .increment(1);
}

pub fn record_wait_duration(network: &str, elapsed: Duration) {
    metrics::histogram!("confirmation_wait_seconds", "network" => network.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_ledger_write(status: &str, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    metrics::counter!("ledger_writes_total", "status" => status.to_string(), "result" => result)
        .increment(1);
}

pub fn record_refund(mode: &'static str, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    metrics::counter!("refunds_total", "mode" => mode, "result" => result).increment(1);
}

pub fn record_rpc_health(network: &str, healthy: bool) {
    metrics::gauge!("chain_rpc_healthy", "network" => network.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
