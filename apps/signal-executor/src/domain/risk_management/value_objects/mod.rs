//! Risk management value objects.

mod check_outcome;
mod risk_settings;

pub use check_outcome::{CheckOutcome, RiskVerdict};
pub use risk_settings::{RiskSettings, RiskSettingsPatch, SettingsError};
