//! Reconcile Use Case
//!
//! Diffs broker positions against the ledger's open lots. Read-only: a
//! mismatch is reported, never corrected.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::ports::{
    BrokerPort, Clock, LedgerPort, NotifierPort, PersistenceError, notify_best_effort,
};
use crate::application::services::{BrokerGateway, GatewayError};
use crate::domain::market_hours::MarketCalendar;
use crate::domain::reconciliation::{ReconciliationResult, compare};
use crate::domain::shared::Ticker;
use crate::observability::record_reconciliation;

/// Reconciliation failures.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Broker positions could not be read.
    #[error("broker positions unavailable: {0}")]
    Gateway(#[from] GatewayError),

    /// Ledger lots could not be read.
    #[error("ledger unavailable: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Use case for comparing broker and ledger holdings.
pub struct ReconcileUseCase<B, L>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
{
    gateway: BrokerGateway<B>,
    ledger: Arc<L>,
    clock: Arc<dyn Clock>,
}

impl<B, L> ReconcileUseCase<B, L>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
{
    /// Create a new ReconcileUseCase.
    pub fn new(gateway: BrokerGateway<B>, ledger: Arc<L>, clock: Arc<dyn Clock>) -> Self {
        Self {
            gateway,
            ledger,
            clock,
        }
    }

    /// Execute one reconciliation run.
    ///
    /// # Errors
    ///
    /// Fails when either side cannot be read.
    pub async fn execute(&self) -> Result<ReconciliationResult, ReconcileError> {
        let positions = self.gateway.positions().await?;
        let lots = self.ledger.all_open_lots().await?;

        let result = compare(
            positions
                .into_iter()
                .map(|p| (Ticker::canonical(&p.ticker), p.qty)),
            lots.into_iter().map(|l| (l.ticker.into_inner(), l.qty)),
            self.clock.now(),
        );

        record_reconciliation(result.mismatches.len());
        if result.is_clean() {
            info!(tickers = result.tickers_checked, "Positions reconciled");
        } else {
            for m in &result.mismatches {
                warn!(
                    ticker = %m.ticker,
                    kind = m.kind.as_str(),
                    broker_qty = %m.broker_qty,
                    ledger_qty = %m.ledger_qty,
                    diff = %m.diff,
                    "Position mismatch"
                );
            }
        }
        Ok(result)
    }
}

/// Runs [`ReconcileUseCase`] periodically during the regular session.
pub struct ReconciliationTask<B, L>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
{
    reconcile: Arc<ReconcileUseCase<B, L>>,
    calendar: Arc<MarketCalendar>,
    notifier: Arc<dyn NotifierPort>,
    interval: Duration,
}

impl<B, L> ReconciliationTask<B, L>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
{
    /// Create a task running every `interval`.
    pub fn new(
        reconcile: Arc<ReconcileUseCase<B, L>>,
        calendar: Arc<MarketCalendar>,
        notifier: Arc<dyn NotifierPort>,
        interval: Duration,
    ) -> Self {
        Self {
            reconcile,
            calendar,
            notifier,
            interval,
        }
    }

    /// One scheduled run: skipped outside the session, reported when
    /// anything disagrees.
    pub async fn run_once(&self) -> Option<ReconciliationResult> {
        if !self.calendar.is_open(self.reconcile.clock.now()) {
            return None;
        }
        match self.reconcile.execute().await {
            Ok(result) => {
                if !result.is_clean() {
                    notify_best_effort(self.notifier.as_ref(), &result.format_report()).await;
                }
                Some(result)
            }
            Err(e) => {
                warn!(error = %e, "Reconciliation failed");
                None
            }
        }
    }

    /// Run until `shutdown` is cancelled. The first run is one interval
    /// after start.
    pub async fn run(&self, shutdown: CancellationToken) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{BrokerPosition, FixedClock};
    use crate::application::services::GatewayConfig;
    use crate::domain::ledger::{NewLot, NewTrade, TradeStatus};
    use crate::domain::reconciliation::MismatchKind;
    use crate::domain::shared::OrderSide;
    use crate::infrastructure::broker::MockBroker;
    use crate::infrastructure::notifications::RecordingNotifier;
    use crate::infrastructure::persistence::InMemoryLedger;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    async fn setup() -> (
        ReconcileUseCase<MockBroker, InMemoryLedger>,
        Arc<MockBroker>,
        Arc<InMemoryLedger>,
    ) {
        let broker = Arc::new(MockBroker::new());
        let gateway = BrokerGateway::new(Arc::clone(&broker), GatewayConfig::default());
        gateway.connect().await.unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap(),
        ));
        (
            ReconcileUseCase::new(gateway, Arc::clone(&ledger), clock),
            broker,
            ledger,
        )
    }

    fn position(ticker: &str, qty: Decimal) -> BrokerPosition {
        BrokerPosition {
            ticker: ticker.to_string(),
            qty,
            avg_cost: dec!(10),
        }
    }

    async fn open_lot(ledger: &InMemoryLedger, ticker: &str, qty: Decimal) {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 14, 45, 0).unwrap();
        let ticker = Ticker::parse(ticker).unwrap();
        let lot = NewLot {
            ticker: ticker.clone(),
            qty,
            entry_price: dec!(10),
            entry_time: at,
            entry_order_id: None,
        };
        let trade = NewTrade {
            status: TradeStatus::Filled,
            filled_qty: qty,
            error: None,
            ..NewTrade::failed(ticker, OrderSide::Buy, "", at)
        };
        ledger.record_buy_fill(lot, trade).await.unwrap();
    }

    #[tokio::test]
    async fn within_tolerance_is_clean() {
        let (reconcile, broker, ledger) = setup().await;
        broker.set_positions(vec![position("Y", dec!(100))]);
        open_lot(&ledger, "Y", dec!(99.9995)).await;

        let result = reconcile.execute().await.unwrap();

        assert!(result.is_clean());
        assert_eq!(result.tickers_checked, 1);
    }

    #[tokio::test]
    async fn aggregates_lots_before_comparing() {
        let (reconcile, broker, ledger) = setup().await;
        broker.set_positions(vec![position("Y", dec!(100)), position("Z", dec!(5))]);
        open_lot(&ledger, "Y", dec!(60)).await;
        open_lot(&ledger, "Y", dec!(39)).await;
        open_lot(&ledger, "W", dec!(1)).await;

        let result = reconcile.execute().await.unwrap();

        let kinds: Vec<_> = result
            .mismatches
            .iter()
            .map(|m| (m.ticker.as_str(), m.kind, m.diff))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("W", MismatchKind::LedgerOnly, dec!(-1)),
                ("Y", MismatchKind::QtyMismatch, dec!(1)),
                ("Z", MismatchKind::BrokerOnly, dec!(5)),
            ]
        );
    }

    #[tokio::test]
    async fn share_class_spellings_reconcile() {
        let (reconcile, broker, ledger) = setup().await;
        broker.set_positions(vec![position("BRK B", dec!(3))]);
        open_lot(&ledger, "NYSE:BRK.B", dec!(3)).await;

        let result = reconcile.execute().await.unwrap();

        assert!(result.is_clean());
        assert_eq!(result.tickers_checked, 1);
    }

    #[tokio::test]
    async fn task_reports_mismatches_only() {
        let (reconcile, broker, _) = setup().await;
        let notifier = Arc::new(RecordingNotifier::new());
        let task = ReconciliationTask::new(
            Arc::new(reconcile),
            Arc::new(MarketCalendar::nyse()),
            notifier.clone(),
            Duration::from_secs(14_400),
        );

        assert!(task.run_once().await.unwrap().is_clean());
        assert!(notifier.messages().is_empty());

        broker.set_positions(vec![position("Y", dec!(3))]);
        task.run_once().await.unwrap();
        assert!(notifier.messages()[0].contains("BROKER_ONLY"));
    }
}
