//! Exchange calendar configuration.

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::market_hours::{MarketCalendar, TradingHours, nyse_holidays_2026};

use super::ConfigError;

/// Market calendar configuration. Times are exchange-local `HH:MM`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// IANA time zone of the exchange.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Regular session open.
    #[serde(default = "default_open")]
    pub open: String,
    /// Regular session close.
    #[serde(default = "default_close")]
    pub close: String,
    /// Pre-market start.
    #[serde(default = "default_pre_market_open")]
    pub pre_market_open: String,
    /// After-hours end.
    #[serde(default = "default_after_hours_close")]
    pub after_hours_close: String,
    /// Full-day closures.
    #[serde(default = "nyse_holidays_2026")]
    pub holidays: Vec<NaiveDate>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            open: default_open(),
            close: default_close(),
            pre_market_open: default_pre_market_open(),
            after_hours_close: default_after_hours_close(),
            holidays: nyse_holidays_2026(),
        }
    }
}

impl MarketConfig {
    /// Build the calendar.
    ///
    /// # Errors
    ///
    /// Fails on an unknown time zone, a malformed time, or a close that
    /// is not after the open.
    pub fn calendar(&self) -> Result<MarketCalendar, ConfigError> {
        let tz: Tz = self.timezone.parse().map_err(|_| {
            ConfigError::ValidationError(format!("market.timezone '{}' is unknown", self.timezone))
        })?;
        let hours = TradingHours {
            open: parse_time("open", &self.open)?,
            close: parse_time("close", &self.close)?,
            pre_market_open: parse_time("pre_market_open", &self.pre_market_open)?,
            after_hours_close: parse_time("after_hours_close", &self.after_hours_close)?,
        };
        if hours.close <= hours.open {
            return Err(ConfigError::ValidationError(
                "market.close must be after market.open".to_string(),
            ));
        }
        if hours.pre_market_open > hours.open || hours.after_hours_close < hours.close {
            return Err(ConfigError::ValidationError(
                "market extended hours must surround the regular session".to_string(),
            ));
        }
        Ok(MarketCalendar::new(tz, hours, self.holidays.iter().copied()))
    }
}

fn parse_time(field: &str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| {
        ConfigError::ValidationError(format!("market.{field} '{raw}' is not HH:MM"))
    })
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_open() -> String {
    "09:30".to_string()
}

fn default_close() -> String {
    "16:00".to_string()
}

fn default_pre_market_open() -> String {
    "04:00".to_string()
}

fn default_after_hours_close() -> String {
    "20:00".to_string()
}
