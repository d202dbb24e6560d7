//! Operator notification configuration.

use serde::{Deserialize, Serialize};

use crate::infrastructure::notifications::TelegramConfig;

/// Notification channels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Telegram bot delivery.
    #[serde(default)]
    pub telegram: TelegramSection,
}

/// Telegram settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramSection {
    /// Send through Telegram; otherwise notifications are only logged.
    #[serde(default)]
    pub enabled: bool,
    /// Bot token.
    #[serde(default)]
    pub bot_token: String,
    /// Target chat.
    #[serde(default)]
    pub chat_id: String,
    /// Bot API base URL override.
    #[serde(default)]
    pub api_url: Option<String>,
}

impl TelegramSection {
    /// Adapter settings when enabled.
    #[must_use]
    pub fn telegram_config(&self) -> Option<TelegramConfig> {
        if !self.enabled {
            return None;
        }
        let config = TelegramConfig::new(self.bot_token.clone(), self.chat_id.clone());
        Some(match &self.api_url {
            Some(url) => config.with_base_url(url.clone()),
            None => config,
        })
    }
}
