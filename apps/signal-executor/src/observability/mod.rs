//! Observability module for metrics.
//!
//! Prometheus counters and gauges for the order pipeline. Logging goes
//! through `tracing` and is configured in the binary.

mod metrics;

pub use metrics::{
    MetricsConfig, MetricsError, init_metrics, record_ledger_divergence, record_order_latency,
    record_order_outcome, record_pending_flush, record_reconciliation, record_reconnect_attempt,
    record_reconnect_exhausted, record_signal, update_broker_connected, update_queue_depth,
};
