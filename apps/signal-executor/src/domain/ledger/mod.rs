//! Position Ledger Bounded Context
//!
//! Local bookkeeping of what the account holds:
//!
//! - **Position lots**: one per BUY fill, closed by a SELL fill
//! - **Trade records**: append-only audit of every order attempt
//! - **Sell allocation**: how a SELL fill closes the open lots of a ticker

mod allocation;
mod lot;
mod trade;

pub use allocation::{LotClose, SellAllocation, allocate_sell};
pub use lot::{LotStatus, NewLot, PositionLot};
pub use trade::{NewTrade, TradeRecord, TradeStatus};
