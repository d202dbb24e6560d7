//! Alpaca adapter configuration.

use std::str::FromStr;
use std::time::Duration;

const PAPER_TRADING_URL: &str = "https://paper-api.alpaca.markets";
const LIVE_TRADING_URL: &str = "https://api.alpaca.markets";
const DATA_URL: &str = "https://data.alpaca.markets";

/// Alpaca account mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlpacaEnvironment {
    /// Paper trading (simulated).
    Paper,
    /// Live trading (real money).
    Live,
}

impl AlpacaEnvironment {
    /// Default trading API base URL for this mode.
    #[must_use]
    pub const fn trading_base_url(&self) -> &'static str {
        match self {
            Self::Paper => PAPER_TRADING_URL,
            Self::Live => LIVE_TRADING_URL,
        }
    }

    /// Check if this is live trading.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

impl std::fmt::Display for AlpacaEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paper => write!(f, "PAPER"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

/// Unknown environment name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown broker environment '{0}', expected PAPER or LIVE")]
pub struct ParseEnvironmentError(pub String);

impl FromStr for AlpacaEnvironment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PAPER" => Ok(Self::Paper),
            "LIVE" => Ok(Self::Live),
            _ => Err(ParseEnvironmentError(s.to_string())),
        }
    }
}

/// Configuration for the Alpaca broker adapter.
#[derive(Debug, Clone)]
pub struct AlpacaConfig {
    /// API key.
    pub api_key: String,
    /// API secret.
    pub api_secret: String,
    /// Account mode.
    pub environment: AlpacaEnvironment,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Retry policy for idempotent reads.
    pub retry: RetryConfig,
    trading_url: Option<String>,
    data_url: Option<String>,
}

impl AlpacaConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(api_key: String, api_secret: String, environment: AlpacaEnvironment) -> Self {
        Self {
            api_key,
            api_secret,
            environment,
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            trading_url: None,
            data_url: None,
        }
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Point both APIs somewhere else, e.g. a local mock server.
    #[must_use]
    pub fn with_base_urls(mut self, trading: impl Into<String>, data: impl Into<String>) -> Self {
        self.trading_url = Some(trading.into());
        self.data_url = Some(data.into());
        self
    }

    /// Trading API base URL.
    #[must_use]
    pub fn trading_base_url(&self) -> &str {
        self.trading_url
            .as_deref()
            .unwrap_or_else(|| self.environment.trading_base_url())
    }

    /// Market data API base URL.
    #[must_use]
    pub fn data_base_url(&self) -> &str {
        self.data_url.as_deref().unwrap_or(DATA_URL)
    }
}

/// Retry policy for GET and DELETE requests. Order submission never
/// retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first included.
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl RetryConfig {
    /// A single attempt, no retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!("paper".parse(), Ok(AlpacaEnvironment::Paper));
        assert_eq!(" LIVE ".parse(), Ok(AlpacaEnvironment::Live));
        assert!("sandbox".parse::<AlpacaEnvironment>().is_err());
    }

    #[test]
    fn default_urls_follow_environment() {
        let paper = AlpacaConfig::new("k".into(), "s".into(), AlpacaEnvironment::Paper);
        assert!(paper.trading_base_url().contains("paper"));
        assert!(paper.data_base_url().contains("data.alpaca"));

        let live = AlpacaConfig::new("k".into(), "s".into(), AlpacaEnvironment::Live);
        assert!(!live.trading_base_url().contains("paper"));
        assert!(live.environment.is_live());
    }

    #[test]
    fn base_urls_can_be_overridden() {
        let config = AlpacaConfig::new("k".into(), "s".into(), AlpacaEnvironment::Paper)
            .with_base_urls("http://127.0.0.1:1", "http://127.0.0.1:2");
        assert_eq!(config.trading_base_url(), "http://127.0.0.1:1");
        assert_eq!(config.data_base_url(), "http://127.0.0.1:2");
    }

    #[test]
    fn environment_display() {
        assert_eq!(AlpacaEnvironment::Paper.to_string(), "PAPER");
        assert_eq!(AlpacaEnvironment::Live.to_string(), "LIVE");
    }
}
