//! Metrics collection and exposition.
//!
//! # Metrics
//! - `payments_operations_total` (counter): operations by name and outcome
//! - `payments_operation_duration_seconds` (histogram): latency per operation
//! - `payments_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `payments_circuit_transitions_total` (counter): transitions by target state
//! - `payments_fallback_total` (counter): calls served by the fallback
//! - `payments_retry_attempts_total` (counter): attempts per retry handler
//! - `payments_transaction_log_size` (gauge): entries in the audit log
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter, so
//! tests and library users pay nothing.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record the outcome and latency of a payment operation.
pub fn record_operation(operation: &'static str, success: bool, fallback_used: bool, duration: Duration) {
    let outcome = match (success, fallback_used) {
        (true, false) => "success",
        (true, true) => "fallback",
        (false, _) => "failure",
    };
    counter!("payments_operations_total", "operation" => operation, "outcome" => outcome).increment(1);
    histogram!("payments_operation_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
}

pub fn record_circuit_state(breaker: &str, state: CircuitState) {
    gauge!("payments_circuit_state", "breaker" => breaker.to_string()).set(state.as_gauge());
}

pub fn record_circuit_transition(breaker: &str, state: CircuitState) {
    record_circuit_state(breaker, state);
    counter!(
        "payments_circuit_transitions_total",
        "breaker" => breaker.to_string(),
        "to" => state.to_string()
    )
    .increment(1);
}

pub fn record_fallback(breaker: &str) {
    counter!("payments_fallback_total", "breaker" => breaker.to_string()).increment(1);
}

pub fn record_retry_attempt(handler: &str) {
    counter!("payments_retry_attempts_total", "handler" => handler.to_string()).increment(1);
}

pub fn record_transaction_log_size(size: usize) {
    gauge!("payments_transaction_log_size").set(size as f64);
}
