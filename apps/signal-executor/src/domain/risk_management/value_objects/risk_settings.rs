//! Risk settings value object.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// The active risk limits and control flags.
///
/// Read fresh for every order so operator changes apply on the next dequeue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    /// Dollar amount spent per BUY.
    pub buy_amount: Decimal,
    /// Maximum OPEN lots across all tickers.
    pub max_open_positions: u32,
    /// Maximum filled BUYs per UTC day.
    pub max_daily_buys: u32,
    /// Maximum summed entry amount of OPEN lots.
    pub max_total_investment: Decimal,
    /// Maximum OPEN lots for one ticker.
    pub max_per_ticker: u32,
    /// Maximum realized loss per UTC day.
    pub max_daily_loss: Decimal,
    /// Cash that must remain after a BUY.
    pub min_cash_reserve: Decimal,
    /// Soft stop: BUYs are blocked, SELLs continue.
    pub paused: bool,
    /// Hard stop: every order is blocked.
    pub killed: bool,
    /// Only trade in the regular session.
    pub regular_hours_only: bool,
    /// Park out-of-hours orders instead of dropping them.
    pub queue_outside_hours: bool,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            buy_amount: dec!(300),
            max_open_positions: 200,
            max_daily_buys: 80,
            max_total_investment: dec!(90000),
            max_per_ticker: 5,
            max_daily_loss: dec!(5000),
            min_cash_reserve: dec!(1000),
            paused: false,
            killed: false,
            regular_hours_only: true,
            queue_outside_hours: true,
        }
    }
}

impl RiskSettings {
    /// Cash a BUY needs on hand: the order amount plus the reserve.
    #[must_use]
    pub fn required_cash(&self) -> Decimal {
        self.buy_amount + self.min_cash_reserve
    }

    /// Check that every limit is usable.
    ///
    /// # Errors
    ///
    /// Names the first field out of range.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.buy_amount <= Decimal::ZERO {
            return Err(SettingsError::NotPositive("buy_amount"));
        }
        if self.max_total_investment <= Decimal::ZERO {
            return Err(SettingsError::NotPositive("max_total_investment"));
        }
        if self.max_daily_loss < Decimal::ZERO {
            return Err(SettingsError::Negative("max_daily_loss"));
        }
        if self.min_cash_reserve < Decimal::ZERO {
            return Err(SettingsError::Negative("min_cash_reserve"));
        }
        Ok(())
    }
}

/// A limit outside its range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// Must be greater than zero.
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    /// Must not be negative.
    #[error("{0} must not be negative")]
    Negative(&'static str),
}

/// Operator change to the limits. Unset fields keep their value.
///
/// The `paused` and `killed` flags are changed by control commands, not
/// here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskSettingsPatch {
    /// New BUY amount.
    #[serde(default)]
    pub buy_amount: Option<Decimal>,
    /// New open-lot cap.
    #[serde(default)]
    pub max_open_positions: Option<u32>,
    /// New daily BUY cap.
    #[serde(default)]
    pub max_daily_buys: Option<u32>,
    /// New investment cap.
    #[serde(default)]
    pub max_total_investment: Option<Decimal>,
    /// New per-ticker cap.
    #[serde(default)]
    pub max_per_ticker: Option<u32>,
    /// New daily loss cap.
    #[serde(default)]
    pub max_daily_loss: Option<Decimal>,
    /// New cash reserve.
    #[serde(default)]
    pub min_cash_reserve: Option<Decimal>,
    /// New regular-hours flag.
    #[serde(default)]
    pub regular_hours_only: Option<bool>,
    /// New parking flag.
    #[serde(default)]
    pub queue_outside_hours: Option<bool>,
}

impl RiskSettingsPatch {
    /// `settings` with this patch applied.
    #[must_use]
    pub fn apply(&self, settings: &RiskSettings) -> RiskSettings {
        RiskSettings {
            buy_amount: self.buy_amount.unwrap_or(settings.buy_amount),
            max_open_positions: self.max_open_positions.unwrap_or(settings.max_open_positions),
            max_daily_buys: self.max_daily_buys.unwrap_or(settings.max_daily_buys),
            max_total_investment: self
                .max_total_investment
                .unwrap_or(settings.max_total_investment),
            max_per_ticker: self.max_per_ticker.unwrap_or(settings.max_per_ticker),
            max_daily_loss: self.max_daily_loss.unwrap_or(settings.max_daily_loss),
            min_cash_reserve: self.min_cash_reserve.unwrap_or(settings.min_cash_reserve),
            paused: settings.paused,
            killed: settings.killed,
            regular_hours_only: self.regular_hours_only.unwrap_or(settings.regular_hours_only),
            queue_outside_hours: self
                .queue_outside_hours
                .unwrap_or(settings.queue_outside_hours),
        }
    }

    /// Whether the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
