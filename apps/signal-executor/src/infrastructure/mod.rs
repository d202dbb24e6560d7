//! Infrastructure Layer
//!
//! Adapters for the ports defined in the application layer. Following
//! hexagonal architecture:
//!
//! - **Driven Adapters (Outbound)**: Implement ports for external systems
//!   - `broker/`: Alpaca REST adapter and an in-process mock
//!   - `persistence/`: SQLite and in-memory stores
//!   - `notifications/`: Telegram and log notifiers
//!
//! - **Driver Adapters (Inbound)**: Expose application to external world
//!   - `http/`: REST API controllers
//!
//! - **Composition**: `config/` wires adapters into use cases

pub mod broker;
pub mod config;
pub mod http;
pub mod notifications;
pub mod persistence;
