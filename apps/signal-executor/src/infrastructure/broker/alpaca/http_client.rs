//! HTTP client for the Alpaca REST APIs.
//!
//! Reads and cancels retry transient failures with exponential backoff.
//! Order submission goes out exactly once: a retry after an ambiguous
//! failure could place a second order.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::api_types::AlpacaErrorResponse;
use super::config::{AlpacaConfig, RetryConfig};
use super::error::AlpacaError;

const KEY_HEADER: &str = "APCA-API-KEY-ID";
const SECRET_HEADER: &str = "APCA-API-SECRET-KEY";

/// Authenticated client for the trading and market data APIs.
#[derive(Debug, Clone)]
pub struct AlpacaHttpClient {
    client: Client,
    api_key: String,
    api_secret: String,
    trading_base_url: String,
    data_base_url: String,
    retry: RetryConfig,
}

impl AlpacaHttpClient {
    /// Create a client from config.
    ///
    /// # Errors
    ///
    /// Fails on missing credentials or when the HTTP client cannot be built.
    pub fn new(config: &AlpacaConfig) -> Result<Self, AlpacaError> {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(AlpacaError::AuthenticationFailed);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AlpacaError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            trading_base_url: config.trading_base_url().trim_end_matches('/').to_string(),
            data_base_url: config.data_base_url().trim_end_matches('/').to_string(),
            retry: config.retry.clone(),
        })
    }

    /// GET from the trading API.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AlpacaError> {
        let url = format!("{}{path}", self.trading_base_url);
        let body = self.send(Method::GET, &url, path, None, &self.retry).await?;
        decode(&body)
    }

    /// GET from the market data API.
    pub async fn data_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AlpacaError> {
        let url = format!("{}{path}", self.data_base_url);
        let body = self.send(Method::GET, &url, path, None, &self.retry).await?;
        decode(&body)
    }

    /// POST to the trading API with a single attempt.
    pub async fn post_once<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        payload: &B,
    ) -> Result<T, AlpacaError> {
        let payload =
            serde_json::to_value(payload).map_err(|e| AlpacaError::Decode(e.to_string()))?;
        let url = format!("{}{path}", self.trading_base_url);
        let body = self
            .send(Method::POST, &url, path, Some(&payload), &RetryConfig::none())
            .await?;
        decode(&body)
    }

    /// DELETE on the trading API. The response body is ignored.
    pub async fn delete(&self, path: &str) -> Result<(), AlpacaError> {
        let url = format!("{}{path}", self.trading_base_url);
        self.send(Method::DELETE, &url, path, None, &self.retry)
            .await
            .map(|_| ())
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        path: &str,
        payload: Option<&serde_json::Value>,
        retry: &RetryConfig,
    ) -> Result<String, AlpacaError> {
        let mut backoff = ExponentialBackoff::new(retry);

        loop {
            let failure = match self.attempt(method.clone(), url, path, payload).await {
                Ok(body) => return Ok(body),
                Err(Failure::Fatal(e)) => return Err(e),
                Err(failure) => failure,
            };

            let Some(delay) = backoff.next_backoff() else {
                return Err(failure.give_up(backoff.attempt));
            };
            let delay = failure.retry_after().unwrap_or(delay);
            warn!(
                %method,
                path,
                attempt = backoff.attempt,
                delay_ms = delay.as_millis(),
                failure = %failure.describe(),
                "Alpaca request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        method: Method,
        url: &str,
        path: &str,
        payload: Option<&serde_json::Value>,
    ) -> Result<String, Failure> {
        let mut request = self
            .client
            .request(method, url)
            .header(KEY_HEADER, &self.api_key)
            .header(SECRET_HEADER, &self.api_secret);
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Failure::Transport(format!("timed out: {e}"))
            } else {
                Failure::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response
            .text()
            .await
            .map_err(|e| Failure::Transport(e.to_string()))?;

        if status.is_success() {
            debug!(path, status = status.as_u16(), "Alpaca request ok");
            return Ok(body);
        }

        let message = serde_json::from_str::<AlpacaErrorResponse>(&body)
            .map_or(body, |err| err.message);

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => Failure::Throttled { retry_after },
            StatusCode::REQUEST_TIMEOUT
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => Failure::Server {
                status: status.as_u16(),
                message,
            },
            StatusCode::UNAUTHORIZED => Failure::Fatal(AlpacaError::AuthenticationFailed),
            StatusCode::NOT_FOUND => Failure::Fatal(AlpacaError::NotFound {
                resource: path.to_string(),
            }),
            StatusCode::FORBIDDEN | StatusCode::UNPROCESSABLE_ENTITY => {
                Failure::Fatal(AlpacaError::Rejected(message))
            }
            _ => Failure::Fatal(AlpacaError::Api {
                status: status.as_u16(),
                message,
            }),
        })
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, AlpacaError> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| AlpacaError::Decode(e.to_string()))
}

/// Outcome of one failed attempt.
#[derive(Debug)]
enum Failure {
    Transport(String),
    Throttled { retry_after: Option<u64> },
    Server { status: u16, message: String },
    Fatal(AlpacaError),
}

impl Failure {
    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after } => retry_after.map(Duration::from_secs),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Transport(msg) => msg.clone(),
            Self::Throttled { .. } => "429 Too Many Requests".to_string(),
            Self::Server { status, message } => format!("{status}: {message}"),
            Self::Fatal(e) => e.to_string(),
        }
    }

    fn give_up(self, attempts: u32) -> AlpacaError {
        match self {
            Self::Fatal(e) => e,
            Self::Throttled { retry_after } => AlpacaError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(60),
            },
            Self::Transport(msg) if attempts <= 1 => AlpacaError::Network(msg),
            Self::Server { status, message } if attempts <= 1 => {
                AlpacaError::Api { status, message }
            }
            other => AlpacaError::MaxRetriesExceeded {
                attempts,
                last: other.describe(),
            },
        }
    }
}

/// Exponential backoff calculator.
struct ExponentialBackoff {
    attempt: u32,
    max_attempts: u32,
    current_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    const fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_attempts,
            current_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
        }
    }

    /// Record a failed attempt; the delay before the next one, if any.
    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.max_attempts {
            return None;
        }

        let backoff = self.current_backoff;
        self.current_backoff = Duration::from_secs_f64(
            (self.current_backoff.as_secs_f64() * self.multiplier)
                .min(self.max_backoff.as_secs_f64()),
        );

        Some(backoff)
    }
}
