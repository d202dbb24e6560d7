//! Status Use Case
//!
//! Snapshot of the pipeline for operators: queue depth, market session,
//! broker session, active settings, and today's risk aggregates.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::application::ports::{
    BrokerPort, Clock, LedgerPort, OrderQueuePort, PersistenceError, SettingsPort,
};
use crate::application::services::{BrokerGateway, ConnectionState};
use crate::domain::market_hours::{MarketCalendar, SessionStatus};
use crate::domain::order_queue::QueueStats;
use crate::domain::risk_management::RiskSettings;

/// Aggregates the risk checks read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskSummary {
    /// OPEN lots across all tickers.
    pub open_lots: u64,
    /// Distinct tickers with OPEN lots.
    pub unique_tickers: usize,
    /// Summed entry amount of OPEN lots.
    pub total_invested: Decimal,
    /// Filled BUYs since UTC midnight.
    pub buys_today: u64,
    /// Realized loss since UTC midnight, as a positive number.
    pub loss_today: Decimal,
}

/// Market session as seen now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketStatus {
    /// Session classification.
    pub session: SessionStatus,
    /// Wait until the next regular open; "now" while open.
    pub next_open_in: String,
}

/// Full status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Report time.
    pub as_of: DateTime<Utc>,
    /// Lane sizes.
    pub queue: QueueStats,
    /// Market session.
    pub market: MarketStatus,
    /// Broker session.
    pub broker: ConnectionState,
    /// Active limits and flags.
    pub settings: RiskSettings,
    /// Today's aggregates.
    pub risk: RiskSummary,
}

/// Use case for the status snapshot.
pub struct StatusUseCase<B, L, Q, S>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
{
    gateway: BrokerGateway<B>,
    ledger: Arc<L>,
    queue: Arc<Q>,
    settings: Arc<S>,
    calendar: Arc<MarketCalendar>,
    clock: Arc<dyn Clock>,
}

impl<B, L, Q, S> StatusUseCase<B, L, Q, S>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
{
    /// Create a new StatusUseCase.
    pub fn new(
        gateway: BrokerGateway<B>,
        ledger: Arc<L>,
        queue: Arc<Q>,
        settings: Arc<S>,
        calendar: Arc<MarketCalendar>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            ledger,
            queue,
            settings,
            calendar,
            clock,
        }
    }

    /// Build the report.
    ///
    /// # Errors
    ///
    /// Fails when the queue, ledger, or settings cannot be read.
    pub async fn execute(&self) -> Result<StatusReport, PersistenceError> {
        let now = self.clock.now();
        Ok(StatusReport {
            as_of: now,
            queue: self.queue.stats().await?,
            market: MarketStatus {
                session: self.calendar.session(now),
                next_open_in: self.calendar.next_open_in(now),
            },
            broker: self.gateway.state(),
            settings: self.settings.load().await?,
            risk: self.risk_summary(now).await?,
        })
    }

    async fn risk_summary(&self, now: DateTime<Utc>) -> Result<RiskSummary, PersistenceError> {
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(now, |midnight| midnight.and_utc());
        let lots = self.ledger.all_open_lots().await?;
        let unique_tickers = lots.iter().map(|l| &l.ticker).collect::<HashSet<_>>().len();
        Ok(RiskSummary {
            open_lots: lots.len() as u64,
            unique_tickers,
            total_invested: lots.iter().map(|l| l.entry_amount).sum(),
            buys_today: self.ledger.buys_since(day_start).await?,
            loss_today: self.ledger.realized_loss_since(day_start).await?,
        })
    }
}
