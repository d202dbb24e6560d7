//! Prometheus metrics for the signal executor.
//!
//! Counters and gauges for intake, queue depth, order outcomes, broker
//! session health, and ledger/broker divergence.
//!
//! # Example
//!
//! ```ignore
//! use signal_executor::observability::{init_metrics, MetricsConfig};
//!
//! init_metrics(&MetricsConfig::default())?;
//! record_signal("queued");
//! ```

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::domain::order_queue::QueueStats;

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for order round-trip time (in seconds).
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            // Order round trips from 50ms to the 30s fill timeout
            latency_buckets: vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0],
        }
    }
}

impl MetricsConfig {
    /// Create a new metrics configuration with custom address.
    #[must_use]
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: addr,
            ..Default::default()
        }
    }
}

/// Initialize the Prometheus metrics exporter.
///
/// This starts an HTTP server that exposes metrics at `/metrics`.
///
/// # Errors
///
/// Returns an error if the metrics exporter fails to start (e.g., port already in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.latency_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(
        addr = %config.listen_addr,
        "Prometheus metrics exporter started"
    );

    Ok(())
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

// ============================================================================
// Intake and Queue
// ============================================================================

/// Record an intake result (`queued`, `duplicate`, `rejected`).
pub fn record_signal(outcome: &'static str) {
    counter!("signals_total", "outcome" => outcome).increment(1);
}

/// Publish lane sizes.
#[allow(clippy::cast_precision_loss)]
pub fn update_queue_depth(stats: &QueueStats) {
    gauge!("queue_depth", "lane" => "sell").set(stats.sell as f64);
    gauge!("queue_depth", "lane" => "buy").set(stats.buy as f64);
    gauge!("queue_depth", "lane" => "pending").set(stats.pending as f64);
}

/// Record pending orders moved to active lanes at market open.
pub fn record_pending_flush(count: u64) {
    counter!("pending_flushed_total").increment(count);
}

// ============================================================================
// Order Execution
// ============================================================================

/// Record the outcome of processing one order.
///
/// # Arguments
///
/// * `side` - `buy` or `sell`
/// * `outcome` - e.g. `bought`, `blocked`, `parked`, `failed`
pub fn record_order_outcome(side: &'static str, outcome: &'static str) {
    counter!("orders_processed_total", "side" => side, "outcome" => outcome).increment(1);
}

/// Record submit-to-final-status time for a broker order.
pub fn record_order_latency(side: &'static str, latency_seconds: f64) {
    histogram!("order_latency_seconds", "side" => side).record(latency_seconds);
}

/// Record a fill that could not be written to the ledger.
pub fn record_ledger_divergence(side: &'static str) {
    counter!("ledger_divergence_total", "side" => side).increment(1);
}

// ============================================================================
// Broker Session
// ============================================================================

/// Record a reconnect attempt.
pub fn record_reconnect_attempt() {
    counter!("broker_reconnect_attempts_total").increment(1);
}

/// Record that the reconnect budget ran out.
pub fn record_reconnect_exhausted() {
    counter!("broker_reconnect_exhausted_total").increment(1);
}

/// Publish whether the broker session is up.
pub fn update_broker_connected(connected: bool) {
    gauge!("broker_connected").set(if connected { 1.0 } else { 0.0 });
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Record a reconciliation run.
#[allow(clippy::cast_precision_loss)]
pub fn record_reconciliation(mismatches: usize) {
    counter!("reconciliation_runs_total").increment(1);
    gauge!("reconciliation_mismatches").set(mismatches as f64);
}
