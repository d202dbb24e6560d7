//! Broker Adapters
//!
//! Implementations of `BrokerPort`.

pub mod alpaca;
mod mock;

pub use alpaca::{AlpacaBrokerAdapter, AlpacaConfig, AlpacaEnvironment, AlpacaError, RetryConfig};
pub use mock::{FillMode, MockBroker};
