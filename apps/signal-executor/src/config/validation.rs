//! Credential checks at startup.

use crate::infrastructure::broker::AlpacaEnvironment;

use super::Config;

/// Errors from environment validation at startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupValidationError {
    /// Missing required credentials for the environment.
    #[error("Missing required credentials for {environment} mode: {details}")]
    MissingCredentials {
        /// The trading environment.
        environment: String,
        /// Details about which credentials are missing.
        details: String,
    },

    /// Invalid environment configuration.
    #[error("Invalid environment configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result of startup environment validation.
#[derive(Debug)]
pub struct StartupValidation {
    /// Warning messages (non-fatal).
    pub warnings: Vec<String>,
}

/// Check that everything the process needs to talk to the outside is set.
///
/// Broker credentials are always required. Telegram credentials are
/// required when Telegram is enabled.
///
/// # Errors
///
/// Returns `StartupValidationError` naming the missing variables.
pub fn validate_startup_environment(
    config: &Config,
) -> Result<StartupValidation, StartupValidationError> {
    let environment = config
        .broker
        .environment()
        .map_err(|e| StartupValidationError::InvalidConfiguration(e.to_string()))?;

    let mut missing = Vec::new();
    if config.broker.api_key.is_empty() {
        missing.push("ALPACA_KEY");
    }
    if config.broker.api_secret.is_empty() {
        missing.push("ALPACA_SECRET");
    }
    let telegram = &config.notifications.telegram;
    if telegram.enabled {
        if telegram.bot_token.is_empty() {
            missing.push("TELEGRAM_BOT_TOKEN");
        }
        if telegram.chat_id.is_empty() {
            missing.push("TELEGRAM_CHAT_ID");
        }
    }
    if !missing.is_empty() {
        return Err(StartupValidationError::MissingCredentials {
            environment: environment.to_string(),
            details: format!(
                "Required environment variables not set: {}. \
                 Set these in your environment or config.yaml.",
                missing.join(", ")
            ),
        });
    }

    let mut warnings = Vec::new();
    if environment == AlpacaEnvironment::Live
        && config
            .broker
            .trading_url
            .as_deref()
            .is_some_and(|url| url.contains("paper"))
    {
        warnings.push(
            "LIVE mode configured but using paper API URL. \
             This may indicate misconfiguration."
                .to_string(),
        );
    }
    if !telegram.enabled {
        warnings.push("Telegram disabled; notifications are only logged".to_string());
    }
    Ok(StartupValidation { warnings })
}
