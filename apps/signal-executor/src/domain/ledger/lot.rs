//! Position lot entity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::shared::{BrokerOrderId, LotId, Ticker};

/// Lot lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LotStatus {
    /// Still held.
    Open,
    /// Sold; immutable from here on.
    Closed,
}

impl LotStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for LotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            other => Err(format!("unknown lot status '{other}'")),
        }
    }
}

/// A lot about to be created from a BUY fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLot {
    /// Ticker bought.
    pub ticker: Ticker,
    /// Filled quantity.
    pub qty: Decimal,
    /// Average fill price.
    pub entry_price: Decimal,
    /// Entry time.
    pub entry_time: DateTime<Utc>,
    /// Broker order that filled it.
    pub entry_order_id: Option<BrokerOrderId>,
}

impl NewLot {
    /// `qty * entry_price`.
    #[must_use]
    pub fn entry_amount(&self) -> Decimal {
        self.qty * self.entry_price
    }
}

/// A persisted lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLot {
    /// Row id.
    pub id: LotId,
    /// Ticker held.
    pub ticker: Ticker,
    /// Quantity held.
    pub qty: Decimal,
    /// Average fill price at entry.
    pub entry_price: Decimal,
    /// `qty * entry_price` at entry.
    pub entry_amount: Decimal,
    /// Entry time.
    pub entry_time: DateTime<Utc>,
    /// Broker order that opened the lot.
    pub entry_order_id: Option<BrokerOrderId>,
    /// Lifecycle state.
    pub status: LotStatus,
    /// Exit fill price.
    pub exit_price: Option<Decimal>,
    /// `qty * exit_price`.
    pub exit_amount: Option<Decimal>,
    /// Exit time.
    pub exit_time: Option<DateTime<Utc>>,
    /// `exit_amount - entry_amount`.
    pub pnl: Option<Decimal>,
    /// `pnl / entry_amount * 100`.
    pub pnl_pct: Option<Decimal>,
}

impl PositionLot {
    /// Check if the lot is still held.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.status, LotStatus::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_round_trips_through_storage_form() {
        assert_eq!("OPEN".parse::<LotStatus>().unwrap(), LotStatus::Open);
        assert_eq!(LotStatus::Closed.to_string(), "CLOSED");
        assert!("open".parse::<LotStatus>().is_err());
    }

    #[test]
    fn new_lot_entry_amount() {
        let lot = NewLot {
            ticker: Ticker::parse("AAPL").unwrap(),
            qty: dec!(1.5),
            entry_price: dec!(200),
            entry_time: Utc::now(),
            entry_order_id: None,
        };
        assert_eq!(lot.entry_amount(), dec!(300));
    }
}
