//! Order Queue Bounded Context
//!
//! Orders waiting for execution live in exactly one of three lanes:
//! sell (highest priority), buy, and pending (parked until market open).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::shared::{IdempotencyKey, OrderSide, Ticker};
use crate::domain::signal::Signal;

/// A queue lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    /// Sell orders, always dequeued first.
    Sell,
    /// Buy orders, dequeued when the sell lane is empty.
    Buy,
    /// Orders parked until the next market open.
    Pending,
}

impl Lane {
    /// The active lane an order with this side belongs in.
    #[must_use]
    pub const fn for_side(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => Self::Buy,
            OrderSide::Sell => Self::Sell,
        }
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sell => "sell",
            Self::Buy => "buy",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order waiting in a lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOrder {
    /// Queue position assigned by the store; `None` until enqueued.
    pub seq: Option<i64>,
    /// Buy or sell.
    pub action: OrderSide,
    /// Ticker to trade.
    pub ticker: Ticker,
    /// Key of the originating signal.
    pub idempotency_key: IdempotencyKey,
    /// When the order first entered the queue.
    pub enqueued_at: DateTime<Utc>,
    /// Why the order was parked, when in the pending lane.
    pub pending_reason: Option<String>,
}

impl QueuedOrder {
    /// Build the order for a freshly accepted signal.
    #[must_use]
    pub fn from_signal(signal: &Signal) -> Self {
        Self {
            seq: None,
            action: signal.action,
            ticker: signal.ticker.clone(),
            idempotency_key: signal.idempotency_key.clone(),
            enqueued_at: signal.received_at,
            pending_reason: None,
        }
    }

    /// The active lane for this order.
    #[must_use]
    pub const fn active_lane(&self) -> Lane {
        Lane::for_side(self.action)
    }
}

/// Lane sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Orders in the sell lane.
    pub sell: u64,
    /// Orders in the buy lane.
    pub buy: u64,
    /// Orders parked in the pending lane.
    pub pending: u64,
}

impl QueueStats {
    /// Total orders across all lanes.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.sell + self.buy + self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn lane_for_side() {
        assert_eq!(Lane::for_side(OrderSide::Sell), Lane::Sell);
        assert_eq!(Lane::for_side(OrderSide::Buy), Lane::Buy);
        assert_eq!(Lane::Pending.to_string(), "pending");
    }

    #[test]
    fn from_signal_copies_identity() {
        let received_at = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        let signal = Signal {
            action: OrderSide::Sell,
            ticker: Ticker::parse("TSLA").unwrap(),
            price: None,
            idempotency_key: IdempotencyKey::new("alert-1"),
            received_at,
            source: None,
            raw_payload: "{}".to_string(),
        };

        let order = QueuedOrder::from_signal(&signal);
        assert_eq!(order.seq, None);
        assert_eq!(order.active_lane(), Lane::Sell);
        assert_eq!(order.idempotency_key.as_str(), "alert-1");
        assert_eq!(order.enqueued_at, received_at);
    }

    #[test]
    fn stats_total() {
        let stats = QueueStats {
            sell: 1,
            buy: 2,
            pending: 3,
        };
        assert_eq!(stats.total(), 6);
    }
}
