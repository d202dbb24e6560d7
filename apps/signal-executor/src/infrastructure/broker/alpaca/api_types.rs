//! Alpaca API request and response types.
//!
//! Alpaca encodes quantities and prices as strings; they are parsed into
//! `Decimal` here so nothing downstream sees a float.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::ports::{BrokerOrderStatus, BrokerPosition, OrderAck, PriceSnapshot};
use crate::domain::shared::BrokerOrderId;

use super::error::AlpacaError;

/// Body of `POST /v2/orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlpacaOrderRequest {
    /// Asset symbol.
    pub symbol: String,
    /// Shares, fractional allowed.
    pub qty: String,
    /// "buy" or "sell".
    pub side: &'static str,
    /// Always "market".
    #[serde(rename = "type")]
    pub order_type: &'static str,
    /// Always "day".
    pub time_in_force: &'static str,
    /// Caller-chosen id; Alpaca rejects a reused one.
    pub client_order_id: String,
}

/// Order as returned by the trading API.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaOrderResponse {
    /// Broker order ID.
    pub id: String,
    /// Client order ID.
    #[serde(default)]
    pub client_order_id: Option<String>,
    /// Order status.
    pub status: String,
    /// Filled quantity.
    #[serde(default)]
    pub filled_qty: Option<String>,
    /// Average fill price.
    #[serde(default)]
    pub filled_avg_price: Option<String>,
}

impl AlpacaOrderResponse {
    /// Convert to an [`OrderAck`]. Equity trades carry no commission.
    ///
    /// # Errors
    ///
    /// Fails when a numeric field is not a decimal.
    pub fn to_order_ack(&self) -> Result<OrderAck, AlpacaError> {
        Ok(OrderAck {
            broker_order_id: BrokerOrderId::new(&self.id),
            status: parse_order_status(&self.status),
            filled_qty: parse_optional(self.filled_qty.as_deref(), "filled_qty")?
                .unwrap_or(Decimal::ZERO),
            avg_fill_price: parse_optional(self.filled_avg_price.as_deref(), "filled_avg_price")?,
            commission: Decimal::ZERO,
        })
    }
}

/// Account fields the adapter reads.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaAccountResponse {
    /// Account ID.
    pub id: String,
    /// Account status, "ACTIVE" when usable.
    #[serde(default)]
    pub status: Option<String>,
    /// Settled cash.
    pub cash: String,
    /// Whether the account is barred from trading.
    #[serde(default)]
    pub trading_blocked: bool,
}

impl AlpacaAccountResponse {
    /// Cash as a decimal.
    ///
    /// # Errors
    ///
    /// Fails when `cash` is not a decimal.
    pub fn cash(&self) -> Result<Decimal, AlpacaError> {
        parse_decimal(&self.cash, "cash")
    }
}

/// Asset lookup result.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaAssetResponse {
    /// Symbol as Alpaca spells it.
    pub symbol: String,
    /// Whether orders are accepted.
    #[serde(default)]
    pub tradable: bool,
    /// Whether fractional quantities are accepted.
    #[serde(default)]
    pub fractionable: bool,
}

/// Snapshot from the market data API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlpacaSnapshotResponse {
    /// Most recent trade.
    #[serde(default)]
    pub latest_trade: Option<AlpacaTrade>,
    /// Previous session's daily bar.
    #[serde(default)]
    pub prev_daily_bar: Option<AlpacaBar>,
}

/// A trade print.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AlpacaTrade {
    /// Price.
    pub p: Decimal,
}

/// An OHLC bar; only the close is read.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AlpacaBar {
    /// Close.
    pub c: Decimal,
}

impl From<AlpacaSnapshotResponse> for PriceSnapshot {
    fn from(snapshot: AlpacaSnapshotResponse) -> Self {
        Self {
            last: snapshot.latest_trade.map(|t| t.p),
            close: snapshot.prev_daily_bar.map(|b| b.c),
        }
    }
}

/// An open position.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaPositionResponse {
    /// Symbol.
    pub symbol: String,
    /// Signed quantity.
    pub qty: String,
    /// Average entry price.
    pub avg_entry_price: String,
}

impl AlpacaPositionResponse {
    /// Convert to a [`BrokerPosition`].
    ///
    /// # Errors
    ///
    /// Fails when a numeric field is not a decimal.
    pub fn to_position(&self) -> Result<BrokerPosition, AlpacaError> {
        Ok(BrokerPosition {
            ticker: self.symbol.clone(),
            qty: parse_decimal(&self.qty, "qty")?,
            avg_cost: parse_decimal(&self.avg_entry_price, "avg_entry_price")?,
        })
    }
}

/// Error body returned alongside non-success statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaErrorResponse {
    /// Numeric error code.
    #[serde(default)]
    pub code: Option<u64>,
    /// Error message.
    pub message: String,
}

/// Map an Alpaca order status onto [`BrokerOrderStatus`].
fn parse_order_status(status: &str) -> BrokerOrderStatus {
    match status.to_ascii_lowercase().as_str() {
        "accepted" | "accepted_for_bidding" | "pending_replace" | "replaced" | "held" => {
            BrokerOrderStatus::Accepted
        }
        "partially_filled" => BrokerOrderStatus::PartiallyFilled,
        "filled" => BrokerOrderStatus::Filled,
        "done_for_day" | "expired" => BrokerOrderStatus::Expired,
        "canceled" => BrokerOrderStatus::Canceled,
        "rejected" => BrokerOrderStatus::Rejected,
        // new, pending_new, pending_cancel, stopped, suspended, calculated
        _ => BrokerOrderStatus::New,
    }
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, AlpacaError> {
    raw.trim()
        .parse()
        .map_err(|_| AlpacaError::Decode(format!("{field}: '{raw}' is not a decimal")))
}

fn parse_optional(raw: Option<&str>, field: &str) -> Result<Option<Decimal>, AlpacaError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_decimal(value, field).map(Some),
    }
}
