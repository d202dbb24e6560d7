//! Broker connection and order timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::services::GatewayConfig;
use crate::infrastructure::broker::{AlpacaConfig, AlpacaEnvironment, RetryConfig};

use super::ConfigError;

/// Broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// `PAPER` or `LIVE`.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// API key ID.
    #[serde(default)]
    pub api_key: String,
    /// API secret key.
    #[serde(default)]
    pub api_secret: String,
    /// Trading API base URL override.
    #[serde(default)]
    pub trading_url: Option<String>,
    /// Market data API base URL override.
    #[serde(default)]
    pub data_url: Option<String>,
    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Attempts for idempotent requests, the first included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Bounded wait for a price snapshot.
    #[serde(default = "default_snapshot_timeout")]
    pub snapshot_timeout_secs: u64,
    /// Wait for a fill before cancelling.
    #[serde(default = "default_order_timeout")]
    pub order_timeout_secs: u64,
    /// Order status poll interval.
    #[serde(default = "default_fill_poll_interval")]
    pub fill_poll_interval_ms: u64,
    /// Reconnect delay unit.
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay_secs: u64,
    /// Reconnect delay cap.
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay_secs: u64,
    /// Reconnect attempts before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            api_key: String::new(),
            api_secret: String::new(),
            trading_url: None,
            data_url: None,
            request_timeout_secs: default_request_timeout(),
            max_attempts: default_max_attempts(),
            snapshot_timeout_secs: default_snapshot_timeout(),
            order_timeout_secs: default_order_timeout(),
            fill_poll_interval_ms: default_fill_poll_interval(),
            reconnect_base_delay_secs: default_reconnect_base_delay(),
            reconnect_max_delay_secs: default_reconnect_max_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl BrokerConfig {
    /// Parsed account mode.
    ///
    /// # Errors
    ///
    /// Fails on anything but `PAPER` or `LIVE`.
    pub fn environment(&self) -> Result<AlpacaEnvironment, ConfigError> {
        self.environment
            .parse::<AlpacaEnvironment>()
            .map_err(|e| ConfigError::ValidationError(format!("broker.environment: {e}")))
    }

    /// Adapter settings.
    ///
    /// # Errors
    ///
    /// Fails when the environment is unknown.
    pub fn alpaca_config(&self) -> Result<AlpacaConfig, ConfigError> {
        let mut config = AlpacaConfig::new(
            self.api_key.clone(),
            self.api_secret.clone(),
            self.environment()?,
        )
        .with_timeout(Duration::from_secs(self.request_timeout_secs))
        .with_retry(RetryConfig {
            max_attempts: self.max_attempts,
            ..RetryConfig::default()
        });
        if self.trading_url.is_some() || self.data_url.is_some() {
            let trading = self
                .trading_url
                .clone()
                .unwrap_or_else(|| config.trading_base_url().to_string());
            let data = self
                .data_url
                .clone()
                .unwrap_or_else(|| config.data_base_url().to_string());
            config = config.with_base_urls(trading, data);
        }
        Ok(config)
    }

    /// Session timing.
    #[must_use]
    pub const fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            snapshot_timeout: Duration::from_secs(self.snapshot_timeout_secs),
            order_timeout: Duration::from_secs(self.order_timeout_secs),
            fill_poll_interval: Duration::from_millis(self.fill_poll_interval_ms),
            reconnect_base_delay: Duration::from_secs(self.reconnect_base_delay_secs),
            reconnect_max_delay: Duration::from_secs(self.reconnect_max_delay_secs),
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }
}

fn default_environment() -> String {
    "PAPER".to_string()
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_snapshot_timeout() -> u64 {
    2
}

const fn default_order_timeout() -> u64 {
    30
}

const fn default_fill_poll_interval() -> u64 {
    500
}

const fn default_reconnect_base_delay() -> u64 {
    5
}

const fn default_reconnect_max_delay() -> u64 {
    300
}

const fn default_max_reconnect_attempts() -> u32 {
    50
}
