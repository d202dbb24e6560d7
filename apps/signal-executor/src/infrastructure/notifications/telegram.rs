//! Telegram Bot API notifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::application::ports::{NOTIFY_TIMEOUT, NotifierPort, NotifyError};

/// Default Bot API base URL.
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Telegram delivery settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token from BotFather.
    pub bot_token: String,
    /// Chat to post into.
    pub chat_id: String,
    /// API base URL.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl TelegramConfig {
    /// Config for the public Bot API.
    #[must_use]
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            base_url: TELEGRAM_API_URL.to_string(),
            timeout: NOTIFY_TIMEOUT,
        }
    }

    /// Override the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct BotResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Posts messages with `sendMessage`.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Create a notifier.
    ///
    /// # Errors
    ///
    /// Returns an error when the token or chat id is empty or the HTTP
    /// client cannot be built.
    pub fn new(config: &TelegramConfig) -> Result<Self, NotifyError> {
        if config.bot_token.is_empty() || config.chat_id.is_empty() {
            return Err(NotifyError::Rejected(
                "telegram bot_token and chat_id are required".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: format!(
                "{}/bot{}/sendMessage",
                config.base_url.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
        })
    }
}

#[async_trait]
impl NotifierPort for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
                disable_web_page_preview: true,
            })
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body: BotResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;

        if status.is_success() && body.ok {
            Ok(())
        } else {
            Err(NotifyError::Rejected(
                body.description
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            ))
        }
    }
}
