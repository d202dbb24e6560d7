// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Signal Executor - Rust Core Library
//!
//! Turns BUY/SELL alert signals into market orders on a brokerage account,
//! gated by market hours and risk limits, with lot-level accounting.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Core business rules
//!   - `signal`: Signal validation and idempotency keys
//!   - `order_queue`: Queued orders and priority lanes
//!   - `market_hours`: Exchange calendar and session status
//!   - `risk_management`: Risk settings and verdicts
//!   - `ledger`: Position lots, trades, FIFO sell allocation
//!   - `reconciliation`: Broker vs ledger comparison
//!
//! - **Application**: Use cases and orchestration
//!   - `ports`: Interfaces for external systems (`BrokerPort`, `LedgerPort`, ...)
//!   - `services`: `BrokerGateway`, `RiskEngine`, `RateLimiter`
//!   - `use_cases`: Intake, ProcessOrder, ExecutionWorker, FlushPending,
//!     Reconcile, Control, Status
//!
//! - **Infrastructure**: Adapters (implementations)
//!   - `broker`: Alpaca REST adapter and a mock broker
//!   - `persistence`: SQLite and in-memory stores
//!   - `notifications`: Telegram and log notifiers
//!   - `http`: REST API
//!   - `config`: Dependency injection container
//!
//! Signals enter through `POST /api/v1/signals`, are recorded and queued in
//! one transaction, and are executed one at a time by the worker: sells
//! before buys, FIFO within a side.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Cross-cutting
// =============================================================================

/// YAML configuration with environment interpolation.
pub mod config;

/// Error codes and HTTP error mapping.
pub mod error;

/// Prometheus metrics.
pub mod observability;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::ledger::{PositionLot, TradeRecord, allocate_sell};
pub use domain::market_hours::{MarketCalendar, SessionStatus};
pub use domain::order_queue::{Lane, QueuedOrder};
pub use domain::risk_management::{RiskSettings, RiskVerdict};
pub use domain::shared::{IdempotencyKey, OrderSide, Ticker};
pub use domain::signal::{Signal, SignalRequest};

// Application re-exports
pub use application::ports::{
    BrokerError, BrokerPort, LedgerPort, NotifierPort, OrderQueuePort, SettingsPort,
};
pub use application::services::{BrokerGateway, RiskEngine};
pub use application::use_cases::{
    ControlUseCase, ExecutionWorker, IntakeSignalUseCase, ProcessOrderUseCase, ReconcileUseCase,
};

// Infrastructure re-exports
pub use infrastructure::broker::{AlpacaBrokerAdapter, AlpacaConfig, AlpacaEnvironment, MockBroker};
pub use infrastructure::config::Container;
pub use infrastructure::http::{AppState, create_router};

pub use config::{Config, load_config};
pub use error::{ErrorCode, ErrorKind, ServiceError};
