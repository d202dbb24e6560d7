//! The individual checks run by the [`RiskEngine`](super::RiskEngine).
//!
//! Each check reads the settings it was handed plus at most one fresh
//! aggregate. Checks that only read settings come first in the chain;
//! the broker round trip comes after them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};

use super::{BrokerGateway, GatewayError};
use crate::application::ports::{BrokerPort, LedgerPort, PersistenceError};
use crate::domain::risk_management::{CheckOutcome, RiskSettings};
use crate::domain::shared::{OrderSide, Ticker};

/// What a check gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct RiskContext<'a> {
    /// Order side.
    pub side: OrderSide,
    /// Ticker being traded.
    pub ticker: &'a Ticker,
    /// Settings read for this order.
    pub settings: &'a RiskSettings,
    /// Evaluation time.
    pub now: DateTime<Utc>,
}

impl RiskContext<'_> {
    /// Midnight UTC of the current day.
    #[must_use]
    pub fn day_start(&self) -> DateTime<Utc> {
        self.now.date_naive().and_time(NaiveTime::MIN).and_utc()
    }
}

/// A check could not be evaluated.
#[derive(Debug, thiserror::Error)]
pub enum RiskCheckError {
    /// Broker call failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Ledger query failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl RiskCheckError {
    /// Whether retrying later could succeed.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        match self {
            Self::Gateway(e) => e.is_connectivity(),
            Self::Persistence(_) => false,
        }
    }
}

/// One link of the risk chain.
#[async_trait]
pub trait RiskCheck: Send + Sync {
    /// Stable name used in logs and reasons.
    fn name(&self) -> &'static str;

    /// Evaluate against the current context.
    async fn evaluate(&self, ctx: &RiskContext<'_>) -> Result<CheckOutcome, RiskCheckError>;
}

/// Blocks every order while the kill switch is on.
#[derive(Debug, Default)]
pub struct KillSwitchCheck;

#[async_trait]
impl RiskCheck for KillSwitchCheck {
    fn name(&self) -> &'static str {
        "kill_switch"
    }

    async fn evaluate(&self, ctx: &RiskContext<'_>) -> Result<CheckOutcome, RiskCheckError> {
        if ctx.settings.killed {
            return Ok(CheckOutcome::fail("Emergency kill switch is active"));
        }
        Ok(CheckOutcome::Pass)
    }
}

/// Blocks buys while paused.
#[derive(Debug, Default)]
pub struct PauseCheck;

#[async_trait]
impl RiskCheck for PauseCheck {
    fn name(&self) -> &'static str {
        "pause"
    }

    async fn evaluate(&self, ctx: &RiskContext<'_>) -> Result<CheckOutcome, RiskCheckError> {
        if ctx.settings.paused {
            return Ok(CheckOutcome::fail("Buying is paused"));
        }
        Ok(CheckOutcome::Pass)
    }
}

/// Requires `cash >= buy_amount + min_cash_reserve` at the broker.
pub struct CashBalanceCheck<B: BrokerPort> {
    gateway: BrokerGateway<B>,
}

impl<B: BrokerPort> CashBalanceCheck<B> {
    /// Create the check.
    pub const fn new(gateway: BrokerGateway<B>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl<B: BrokerPort + 'static> RiskCheck for CashBalanceCheck<B> {
    fn name(&self) -> &'static str {
        "cash_balance"
    }

    async fn evaluate(&self, ctx: &RiskContext<'_>) -> Result<CheckOutcome, RiskCheckError> {
        let cash = self.gateway.available_cash().await?;
        let needed = ctx.settings.required_cash();
        if cash < needed {
            return Ok(CheckOutcome::fail(format!(
                "Insufficient cash. Available: ${:.2}, Need: ${:.2} + ${:.2} reserve = ${:.2}",
                cash, ctx.settings.buy_amount, ctx.settings.min_cash_reserve, needed
            )));
        }
        Ok(CheckOutcome::Pass)
    }
}

/// Requires `max_total_investment - invested >= buy_amount`.
pub struct TotalInvestmentCheck<L: LedgerPort> {
    ledger: Arc<L>,
}

impl<L: LedgerPort> TotalInvestmentCheck<L> {
    /// Create the check.
    pub const fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<L: LedgerPort + 'static> RiskCheck for TotalInvestmentCheck<L> {
    fn name(&self) -> &'static str {
        "total_investment"
    }

    async fn evaluate(&self, ctx: &RiskContext<'_>) -> Result<CheckOutcome, RiskCheckError> {
        let invested = self.ledger.total_invested().await?;
        let remaining = ctx.settings.max_total_investment - invested;
        if remaining < ctx.settings.buy_amount {
            return Ok(CheckOutcome::fail(format!(
                "Total investment limit reached. Invested: ${:.2} / ${:.2}",
                invested, ctx.settings.max_total_investment
            )));
        }
        Ok(CheckOutcome::Pass)
    }
}

/// Caps OPEN lots across all tickers.
pub struct OpenPositionsCheck<L: LedgerPort> {
    ledger: Arc<L>,
}

impl<L: LedgerPort> OpenPositionsCheck<L> {
    /// Create the check.
    pub const fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<L: LedgerPort + 'static> RiskCheck for OpenPositionsCheck<L> {
    fn name(&self) -> &'static str {
        "open_positions"
    }

    async fn evaluate(&self, ctx: &RiskContext<'_>) -> Result<CheckOutcome, RiskCheckError> {
        let open = self.ledger.open_lot_count().await?;
        let max = u64::from(ctx.settings.max_open_positions);
        if open >= max {
            return Ok(CheckOutcome::fail(format!(
                "Max open positions reached: {open}/{max}"
            )));
        }
        Ok(CheckOutcome::Pass)
    }
}

/// Caps OPEN lots for the order's ticker.
pub struct PerTickerCheck<L: LedgerPort> {
    ledger: Arc<L>,
}

impl<L: LedgerPort> PerTickerCheck<L> {
    /// Create the check.
    pub const fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<L: LedgerPort + 'static> RiskCheck for PerTickerCheck<L> {
    fn name(&self) -> &'static str {
        "per_ticker"
    }

    async fn evaluate(&self, ctx: &RiskContext<'_>) -> Result<CheckOutcome, RiskCheckError> {
        let open = self.ledger.open_lot_count_for(ctx.ticker).await?;
        let max = u64::from(ctx.settings.max_per_ticker);
        if open >= max {
            return Ok(CheckOutcome::fail(format!(
                "{}: max duplicate buys reached ({open}/{max})",
                ctx.ticker
            )));
        }
        Ok(CheckOutcome::Pass)
    }
}

/// Caps filled BUYs since UTC midnight.
pub struct DailyBuysCheck<L: LedgerPort> {
    ledger: Arc<L>,
}

impl<L: LedgerPort> DailyBuysCheck<L> {
    /// Create the check.
    pub const fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<L: LedgerPort + 'static> RiskCheck for DailyBuysCheck<L> {
    fn name(&self) -> &'static str {
        "daily_buys"
    }

    async fn evaluate(&self, ctx: &RiskContext<'_>) -> Result<CheckOutcome, RiskCheckError> {
        let buys = self.ledger.buys_since(ctx.day_start()).await?;
        let max = u64::from(ctx.settings.max_daily_buys);
        if buys >= max {
            return Ok(CheckOutcome::fail(format!(
                "Daily buy limit reached: {buys}/{max}"
            )));
        }
        Ok(CheckOutcome::Pass)
    }
}

/// Stops buying once today's realized loss reaches the limit.
pub struct DailyLossCheck<L: LedgerPort> {
    ledger: Arc<L>,
}

impl<L: LedgerPort> DailyLossCheck<L> {
    /// Create the check.
    pub const fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<L: LedgerPort + 'static> RiskCheck for DailyLossCheck<L> {
    fn name(&self) -> &'static str {
        "daily_loss"
    }

    async fn evaluate(&self, ctx: &RiskContext<'_>) -> Result<CheckOutcome, RiskCheckError> {
        let loss = self.ledger.realized_loss_since(ctx.day_start()).await?.abs();
        if loss >= ctx.settings.max_daily_loss {
            return Ok(CheckOutcome::fail(format!(
                "Daily loss limit reached: -${:.2} / -${:.2}",
                loss, ctx.settings.max_daily_loss
            )));
        }
        Ok(CheckOutcome::Pass)
    }
}
