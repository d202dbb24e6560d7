//! Alpaca Markets Broker Adapter
//!
//! `BrokerPort` over Alpaca's REST trading and market data APIs:
//! - account check as the session handshake
//! - asset lookup, snapshots, day market orders, positions
//! - retries with exponential backoff on reads, single-shot submission
//! - PAPER and LIVE environments

mod adapter;
mod api_types;
mod config;
mod error;
mod http_client;

pub use adapter::AlpacaBrokerAdapter;
pub use config::{AlpacaConfig, AlpacaEnvironment, ParseEnvironmentError, RetryConfig};
pub use error::AlpacaError;
