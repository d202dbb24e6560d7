//! Observability configuration for logging and metrics.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::observability::MetricsConfig;

use super::ConfigError;

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default log directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Serve Prometheus metrics.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Metrics listener address.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_enabled: default_metrics_enabled(),
            metrics_addr: default_metrics_addr(),
        }
    }
}

impl ObservabilityConfig {
    /// Exporter settings.
    ///
    /// # Errors
    ///
    /// Fails when `metrics_addr` is not a socket address.
    pub fn metrics_config(&self) -> Result<MetricsConfig, ConfigError> {
        let addr: SocketAddr = self.metrics_addr.parse().map_err(|_| {
            ConfigError::ValidationError(format!(
                "observability.metrics_addr '{}' is not a socket address",
                self.metrics_addr
            ))
        })?;
        Ok(MetricsConfig::with_addr(addr))
    }
}

fn default_log_level() -> String {
    "signal_executor=info".to_string()
}

const fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}
