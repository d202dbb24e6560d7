//! Broker Port (Driven Port)
//!
//! Interface for interacting with a brokerage for order execution.
//! Every call may fail with a connectivity error that is distinct from a
//! business rejection; the gateway relies on that split to decide
//! between reconnecting and recording a failed order.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{BrokerOrderId, IdempotencyKey, OrderSide, Ticker};

/// A ticker resolved to something the broker can trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Canonical ticker.
    pub ticker: Ticker,
    /// Symbol the broker expects in order requests.
    pub broker_symbol: String,
}

/// One-shot market data for an instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// Last trade price.
    pub last: Option<Decimal>,
    /// Prior session close.
    pub close: Option<Decimal>,
}

impl PriceSnapshot {
    /// The last price if positive, else the prior close if positive.
    #[must_use]
    pub fn usable_price(&self) -> Option<Decimal> {
        self.last
            .filter(|p| *p > Decimal::ZERO)
            .or_else(|| self.close.filter(|p| *p > Decimal::ZERO))
    }
}

/// Request to submit a day market order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketOrderRequest {
    /// Client order id; the signal's idempotency key.
    pub client_order_id: IdempotencyKey,
    /// Instrument to trade.
    pub instrument: Instrument,
    /// Buy or sell.
    pub side: OrderSide,
    /// Shares, fractional allowed.
    pub quantity: Decimal,
}

impl MarketOrderRequest {
    /// Create a market order request.
    #[must_use]
    pub const fn new(
        client_order_id: IdempotencyKey,
        instrument: Instrument,
        side: OrderSide,
        quantity: Decimal,
    ) -> Self {
        Self {
            client_order_id,
            instrument,
            side,
            quantity,
        }
    }
}

/// Broker-side order state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerOrderStatus {
    /// Received, not yet routed.
    New,
    /// Routed, resting.
    Accepted,
    /// Some quantity filled, order still working.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Cancelled.
    Canceled,
    /// Expired at end of day.
    Expired,
    /// Rejected by the broker or venue.
    Rejected,
}

impl BrokerOrderStatus {
    /// Whether the order can no longer change.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Canceled | Self::Expired | Self::Rejected
        )
    }
}

/// Acknowledgment or status report for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    /// Broker-assigned order ID.
    pub broker_order_id: BrokerOrderId,
    /// Current status.
    pub status: BrokerOrderStatus,
    /// Filled quantity so far.
    pub filled_qty: Decimal,
    /// Average fill price, once anything filled.
    pub avg_fill_price: Option<Decimal>,
    /// Commission charged.
    pub commission: Decimal,
}

/// A position as the broker reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerPosition {
    /// Broker symbol.
    pub ticker: String,
    /// Shares held (negative when short).
    pub qty: Decimal,
    /// Average cost basis per share.
    pub avg_cost: Decimal,
}

/// Broker port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Connection error.
    #[error("Broker connection error: {message}")]
    ConnectionError {
        /// Error details.
        message: String,
    },

    /// No tradable instrument for the ticker.
    #[error("Contract not found: {ticker}")]
    ContractNotFound {
        /// The ticker that failed to resolve.
        ticker: String,
    },

    /// Order rejected by broker.
    #[error("Order rejected: {reason}")]
    OrderRejected {
        /// Rejection reason.
        reason: String,
    },

    /// Order not found.
    #[error("Order not found: {order_id}")]
    OrderNotFound {
        /// The missing order ID.
        order_id: String,
    },

    /// Insufficient funds.
    #[error("Insufficient buying power")]
    InsufficientFunds,

    /// Rate limited.
    #[error("Rate limited by broker")]
    RateLimited,

    /// Unknown error.
    #[error("Broker error: {message}")]
    Unknown {
        /// Error details.
        message: String,
    },
}

impl BrokerError {
    /// Whether the session itself is unusable.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::ConnectionError { .. })
    }
}

/// Port for broker interactions.
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Establish or verify the authenticated session.
    async fn connect(&self) -> Result<(), BrokerError>;

    /// Resolve a ticker to a tradable instrument.
    async fn qualify(&self, ticker: &Ticker) -> Result<Instrument, BrokerError>;

    /// Fetch last and prior-close prices.
    async fn snapshot(&self, instrument: &Instrument) -> Result<PriceSnapshot, BrokerError>;

    /// Submit a day market order.
    async fn submit_market_order(
        &self,
        request: MarketOrderRequest,
    ) -> Result<OrderAck, BrokerError>;

    /// Get order status.
    async fn get_order(&self, broker_order_id: &BrokerOrderId) -> Result<OrderAck, BrokerError>;

    /// Cancel a resting order.
    async fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), BrokerError>;

    /// Cash available for new positions.
    async fn available_cash(&self) -> Result<Decimal, BrokerError>;

    /// All positions held in the account.
    async fn positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn snapshot_prefers_last_then_close() {
        let both = PriceSnapshot {
            last: Some(dec!(10)),
            close: Some(dec!(9)),
        };
        assert_eq!(both.usable_price(), Some(dec!(10)));

        let zero_last = PriceSnapshot {
            last: Some(Decimal::ZERO),
            close: Some(dec!(9)),
        };
        assert_eq!(zero_last.usable_price(), Some(dec!(9)));

        assert_eq!(PriceSnapshot::default().usable_price(), None);
    }

    #[test]
    fn done_statuses() {
        assert!(BrokerOrderStatus::Filled.is_done());
        assert!(BrokerOrderStatus::Canceled.is_done());
        assert!(!BrokerOrderStatus::PartiallyFilled.is_done());
        assert!(!BrokerOrderStatus::Accepted.is_done());
    }

    #[test]
    fn connectivity_classification() {
        assert!(
            BrokerError::ConnectionError {
                message: "reset".to_string()
            }
            .is_connectivity()
        );
        assert!(
            !BrokerError::ContractNotFound {
                ticker: "ZZZZ".to_string()
            }
            .is_connectivity()
        );
        assert!(!BrokerError::RateLimited.is_connectivity());
    }
}
