//! Shared Value Objects
//!
//! Immutable domain types used across bounded contexts.
//! Value objects are compared by value, not identity.

mod identifiers;
mod order_side;
mod ticker;

pub use identifiers::{BrokerOrderId, IdempotencyKey, LotId, TradeId};
pub use order_side::{OrderSide, ParseSideError};
pub use ticker::{Ticker, TickerError};
