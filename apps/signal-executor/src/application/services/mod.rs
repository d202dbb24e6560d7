//! Application Services
//!
//! Application services coordinate domain logic and infrastructure adapters.
//! They differ from use cases in that they hold state across orders: the
//! broker session, the risk chain, and the pacing primitives used by the
//! worker loop.

mod broker_gateway;
mod poll_backoff;
mod rate_limiter;
mod reconnect_policy;
mod risk_checks;
mod risk_engine;

pub use broker_gateway::{
    BrokerGateway, ConnectionState, FillResult, GatewayConfig, GatewayError, GatewayEvent,
};
pub use poll_backoff::PollBackoff;
pub use rate_limiter::RateLimiter;
pub use reconnect_policy::ReconnectPolicy;
pub use risk_checks::{
    CashBalanceCheck, DailyBuysCheck, DailyLossCheck, KillSwitchCheck, OpenPositionsCheck,
    PauseCheck, PerTickerCheck, RiskCheck, RiskCheckError, RiskContext, TotalInvestmentCheck,
};
pub use risk_engine::RiskEngine;
