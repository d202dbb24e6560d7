//! Application Ports (Driver and Driven)
//!
//! Ports define interfaces for interacting with external systems.
//! - **Driver Ports** (Primary/Inbound): How the world uses our application
//! - **Driven Ports** (Secondary/Outbound): How our application uses external systems

mod broker_port;
mod clock_port;
mod intake_store_port;
mod ledger_port;
mod notifier_port;
mod order_queue_port;
mod persistence_error;
mod settings_port;

pub use broker_port::{
    BrokerError, BrokerOrderStatus, BrokerPort, BrokerPosition, Instrument, MarketOrderRequest,
    OrderAck, PriceSnapshot,
};
pub use clock_port::{Clock, FixedClock, SystemClock};
pub use intake_store_port::{IntakeInsert, IntakeStorePort};
pub use ledger_port::LedgerPort;
pub use notifier_port::{NOTIFY_TIMEOUT, NotifierPort, NotifyError, notify_best_effort};
pub use order_queue_port::OrderQueuePort;
pub use persistence_error::PersistenceError;
pub use settings_port::SettingsPort;
