//! Trade record entity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::shared::{BrokerOrderId, IdempotencyKey, LotId, OrderSide, Ticker, TradeId};

/// Terminal and non-terminal trade states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    /// Submitted, outcome unknown.
    Pending,
    /// Fully filled.
    Filled,
    /// Some quantity filled before the order ended.
    Partial,
    /// Cancelled with nothing filled.
    Cancelled,
    /// Rejected, unfilled, or errored.
    Failed,
}

impl TradeStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Filled => "FILLED",
            Self::Partial => "PARTIAL",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
        }
    }

    /// Whether any quantity moved.
    #[must_use]
    pub const fn has_fill(&self) -> bool {
        matches!(self, Self::Filled | Self::Partial)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "FILLED" => Ok(Self::Filled),
            "PARTIAL" => Ok(Self::Partial),
            "CANCELLED" => Ok(Self::Cancelled),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown trade status '{other}'")),
        }
    }
}

/// A trade record about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrade {
    /// Ticker traded.
    pub ticker: Ticker,
    /// Buy or sell.
    pub side: OrderSide,
    /// Quantity asked for, when known.
    pub requested_qty: Option<Decimal>,
    /// Quantity filled.
    pub filled_qty: Decimal,
    /// Dollar amount asked for (BUY).
    pub requested_amount: Option<Decimal>,
    /// Average fill price.
    pub fill_price: Option<Decimal>,
    /// Commission charged.
    pub commission: Decimal,
    /// Broker order id.
    pub broker_order_id: Option<BrokerOrderId>,
    /// Outcome.
    pub status: TradeStatus,
    /// Lots this trade opened or closed, in order.
    pub lot_ids: Vec<LotId>,
    /// Aggregate realized pnl (SELL).
    pub pnl: Option<Decimal>,
    /// Failure description.
    pub error: Option<String>,
    /// Key of the signal that caused the trade.
    pub idempotency_key: Option<IdempotencyKey>,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

impl NewTrade {
    /// A FAILED record with nothing filled.
    #[must_use]
    pub fn failed(
        ticker: Ticker,
        side: OrderSide,
        error: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticker,
            side,
            requested_qty: None,
            filled_qty: Decimal::ZERO,
            requested_amount: None,
            fill_price: None,
            commission: Decimal::ZERO,
            broker_order_id: None,
            status: TradeStatus::Failed,
            lot_ids: Vec::new(),
            pnl: None,
            error: Some(error.into()),
            idempotency_key: None,
            created_at,
        }
    }
}

/// A persisted trade record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Row id.
    pub id: TradeId,
    /// Ticker traded.
    pub ticker: Ticker,
    /// Buy or sell.
    pub side: OrderSide,
    /// Quantity asked for.
    pub requested_qty: Option<Decimal>,
    /// Quantity filled.
    pub filled_qty: Decimal,
    /// Dollar amount asked for.
    pub requested_amount: Option<Decimal>,
    /// Average fill price.
    pub fill_price: Option<Decimal>,
    /// Commission charged.
    pub commission: Decimal,
    /// Broker order id.
    pub broker_order_id: Option<BrokerOrderId>,
    /// Outcome.
    pub status: TradeStatus,
    /// Linked lots, in order.
    pub lot_ids: Vec<LotId>,
    /// Aggregate realized pnl.
    pub pnl: Option<Decimal>,
    /// Failure description.
    pub error: Option<String>,
    /// Originating signal key.
    pub idempotency_key: Option<IdempotencyKey>,
    /// Write time.
    pub created_at: DateTime<Utc>,
}
