//! Order side value object.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Side of a signal, order, or trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    /// Buy (open a new lot).
    Buy,
    /// Sell (close every open lot for the ticker).
    Sell,
}

impl OrderSide {
    /// Canonical upper-case representation (`BUY` / `SELL`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// Lower-case label for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }

    /// Check if this is a buy.
    #[must_use]
    pub const fn is_buy(&self) -> bool {
        matches!(self, Self::Buy)
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a side string is neither BUY nor SELL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid action '{0}': expected BUY or SELL")]
pub struct ParseSideError(pub String);

impl FromStr for OrderSide {
    type Err = ParseSideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            _ => Err(ParseSideError(s.to_string())),
        }
    }
}
