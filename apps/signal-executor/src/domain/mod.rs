//! Domain Layer
//!
//! Business rules with no infrastructure dependencies.
//!
//! # Bounded Contexts
//!
//! - [`signal`]: Inbound BUY/SELL signals and idempotency keys
//! - [`order_queue`]: Queued orders and their priority lanes
//! - [`market_hours`]: Exchange session calendar
//! - [`risk_management`]: Risk settings and check outcomes
//! - [`ledger`]: Position lots, trade records, and sell allocation
//! - [`reconciliation`]: Broker vs ledger position comparison

pub mod ledger;
pub mod market_hours;
pub mod order_queue;
pub mod reconciliation;
pub mod risk_management;
pub mod shared;
pub mod signal;
