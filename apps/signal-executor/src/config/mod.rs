//! Configuration loading for the signal executor.
//!
//! Provides configuration loading, validation, and environment variable
//! interpolation for every component.
//!
//! # Usage
//!
//! ```rust,ignore
//! use signal_executor::config::load_config;
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("custom/config.yaml"))?;
//!
//! println!("HTTP port: {}", config.server.http_port);
//! ```

mod broker;
mod execution;
mod market;
mod notifications;
mod observability;
mod persistence;
mod reconciliation;
mod server;
mod validation;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::risk_management::RiskSettings;

pub use broker::BrokerConfig;
pub use execution::ExecutionSection;
pub use market::MarketConfig;
pub use notifications::{NotificationsConfig, TelegramSection};
pub use observability::ObservabilityConfig;
pub use persistence::PersistenceConfig;
pub use reconciliation::ReconciliationConfig;
pub use server::ServerConfig;
pub use validation::{StartupValidation, StartupValidationError, validate_startup_environment};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "SIGNAL_EXECUTOR_CONFIG";

/// Config file used when nothing else is named.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server.
    #[serde(default)]
    pub server: ServerConfig,
    /// Broker connection and order timing.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Worker pacing and sizing.
    #[serde(default)]
    pub execution: ExecutionSection,
    /// Exchange calendar.
    #[serde(default)]
    pub market: MarketConfig,
    /// Limits written to the settings row on first start.
    #[serde(default)]
    pub risk_defaults: RiskSettings,
    /// Database.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Periodic reconciliation.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Operator notifications.
    #[serde(default)]
    pub notifications: NotificationsConfig,
    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Built-in configuration, used when no file is named and `config.yaml` is
/// absent. Reads credentials from the environment.
pub const EMBEDDED_CONFIG: &str = include_str!("../../config.example.yaml");

/// Load configuration from a YAML file with environment variable interpolation.
///
/// The path is `path`, else `$SIGNAL_EXECUTOR_CONFIG`, else `config.yaml`.
/// When none of those name a file and `config.yaml` does not exist, the
/// [`EMBEDDED_CONFIG`] is used.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let explicit = path
        .map(str::to_string)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok());

    let path = match explicit {
        Some(path) => path,
        None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => {
            DEFAULT_CONFIG_PATH.to_string()
        }
        None => return load_config_from_string(EMBEDDED_CONFIG),
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = if interpolated.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map_or("", |m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let broker = &config.broker;
    broker.environment()?;
    if broker.request_timeout_secs == 0
        || broker.snapshot_timeout_secs == 0
        || broker.order_timeout_secs == 0
        || broker.fill_poll_interval_ms == 0
    {
        return Err(invalid("broker timeouts and poll interval must be positive"));
    }
    if broker.max_attempts == 0 || broker.max_reconnect_attempts == 0 {
        return Err(invalid("broker attempt counts must be positive"));
    }
    if broker.reconnect_base_delay_secs > broker.reconnect_max_delay_secs {
        return Err(invalid(
            "broker.reconnect_base_delay_secs must not exceed reconnect_max_delay_secs",
        ));
    }

    let execution = &config.execution;
    if execution.max_orders_per_second == 0 {
        return Err(invalid("execution.max_orders_per_second must be positive"));
    }
    if execution.poll_min_ms == 0 || execution.poll_min_ms > execution.poll_max_ms {
        return Err(invalid(
            "execution.poll_min_ms must be positive and not exceed poll_max_ms",
        ));
    }
    if execution.error_backoff_secs == 0 {
        return Err(invalid("execution.error_backoff_secs must be positive"));
    }

    config.market.calendar()?;

    config
        .risk_defaults
        .validate()
        .map_err(|e| invalid(format!("risk_defaults.{e}")))?;

    if config.persistence.max_connections == 0 {
        return Err(invalid("persistence.max_connections must be positive"));
    }
    if config.reconciliation.enabled && config.reconciliation.interval_secs == 0 {
        return Err(invalid("reconciliation.interval_secs must be positive"));
    }
    if config.observability.metrics_enabled {
        config.observability.metrics_config()?;
    }

    Ok(())
}
