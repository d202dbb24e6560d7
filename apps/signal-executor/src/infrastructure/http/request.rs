//! HTTP request DTOs.
//!
//! Signal bodies deserialize straight into
//! [`SignalRequest`](crate::domain::signal::SignalRequest) and settings
//! patches into
//! [`RiskSettingsPatch`](crate::domain::risk_management::RiskSettingsPatch).

use serde::{Deserialize, Serialize};

/// Default page size for trade history.
pub const DEFAULT_TRADE_LIMIT: u32 = 20;

/// Largest page size for trade history.
pub const MAX_TRADE_LIMIT: u32 = 500;

/// Query string for `GET /api/v1/trades`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradesQuery {
    /// Number of most recent trades to return.
    #[serde(default)]
    pub limit: Option<u32>,
}

impl TradesQuery {
    /// Requested limit, defaulted and clamped.
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_TRADE_LIMIT)
            .clamp(1, MAX_TRADE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_defaulted_and_clamped() {
        assert_eq!(TradesQuery::default().effective_limit(), DEFAULT_TRADE_LIMIT);
        assert_eq!(TradesQuery { limit: Some(0) }.effective_limit(), 1);
        assert_eq!(
            TradesQuery { limit: Some(10_000) }.effective_limit(),
            MAX_TRADE_LIMIT
        );
    }
}
