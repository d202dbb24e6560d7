//! Worker pacing and order sizing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::use_cases::{ExecutionConfig, WorkerConfig};

/// Execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSection {
    /// Process-wide submission rate cap.
    #[serde(default = "default_max_orders_per_second")]
    pub max_orders_per_second: u32,
    /// First sleep after an empty dequeue.
    #[serde(default = "default_poll_min")]
    pub poll_min_ms: u64,
    /// Longest sleep between empty dequeues.
    #[serde(default = "default_poll_max")]
    pub poll_max_ms: u64,
    /// Sleep after a queue error or deferred order.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
    /// Decimal places kept on computed BUY quantities.
    #[serde(default = "default_qty_decimals")]
    pub qty_decimals: u32,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            max_orders_per_second: default_max_orders_per_second(),
            poll_min_ms: default_poll_min(),
            poll_max_ms: default_poll_max(),
            error_backoff_secs: default_error_backoff(),
            qty_decimals: default_qty_decimals(),
        }
    }
}

impl ExecutionSection {
    /// Worker loop pacing.
    #[must_use]
    pub const fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_min: Duration::from_millis(self.poll_min_ms),
            poll_max: Duration::from_millis(self.poll_max_ms),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
        }
    }

    /// Engine sizing.
    #[must_use]
    pub const fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            qty_decimals: self.qty_decimals,
        }
    }
}

const fn default_max_orders_per_second() -> u32 {
    10
}

const fn default_poll_min() -> u64 {
    100
}

const fn default_poll_max() -> u64 {
    2000
}

const fn default_error_backoff() -> u64 {
    5
}

const fn default_qty_decimals() -> u32 {
    4
}
