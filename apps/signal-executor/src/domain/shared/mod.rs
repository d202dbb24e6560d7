//! Shared Domain Types
//!
//! Value objects shared across bounded contexts.

pub mod value_objects;

pub use value_objects::{
    BrokerOrderId, IdempotencyKey, LotId, OrderSide, ParseSideError, Ticker, TickerError, TradeId,
};
