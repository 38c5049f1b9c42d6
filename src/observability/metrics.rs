//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tx_executor_submissions_total` (counter): submit outcomes by `outcome`
//! - `tx_executor_confirmations_total` (counter): confirmation outcomes by `outcome`
//! - `tx_executor_submit_latency_seconds` (histogram): submit call duration
//! - `tx_executor_confirm_latency_seconds` (histogram): submit-to-confirmation duration
//! - `tx_executor_queue_depth` (gauge): transactions waiting for dispatch
//! - `tx_executor_transactions_total` (gauge): transactions executed so far
//! - `tx_executor_nonce_refreshes_total` (counter): ledger nonce reads
//! - `tx_executor_ledger_health` (gauge): 1=healthy, 0=unhealthy

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_submission(outcome: &'static str, latency: Option<Duration>) {
    counter!("tx_executor_submissions_total", "outcome" => outcome).increment(1);
    if let Some(latency) = latency {
        histogram!("tx_executor_submit_latency_seconds").record(latency.as_secs_f64());
    }
}

pub fn record_confirmation(outcome: &'static str, latency: Option<Duration>) {
    counter!("tx_executor_confirmations_total", "outcome" => outcome).increment(1);
    if let Some(latency) = latency {
        histogram!("tx_executor_confirm_latency_seconds").record(latency.as_secs_f64());
    }
}

pub fn record_queue_depth(depth: u64) {
    gauge!("tx_executor_queue_depth").set(depth as f64);
}

pub fn record_total_transactions(total: u64) {
    gauge!("tx_executor_transactions_total").set(total as f64);
}

pub fn record_nonce_refresh() {
    counter!("tx_executor_nonce_refreshes_total").increment(1);
}

pub fn record_ledger_health(endpoint: &str, healthy: bool) {
    gauge!("tx_executor_ledger_health", "endpoint" => endpoint.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
