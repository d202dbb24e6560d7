//! Pipeline Integration Tests
//!
//! Signals flow through intake, the SQLite queue, the execution worker, and
//! the SQLite ledger against a mock broker:
//! - Buy then sell closes the lot with realized pnl
//! - Sells are executed before earlier buys
//! - Duplicate signals never reach the broker
//! - Weekend signals park and run after the market-open flush
//! - Pausing blocks buys while sells still close lots
//! - Reconciliation compares broker holdings with open lots
//! - Share-class spellings ("BRK B", "BRK.B") resolve to one ticker

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signal_executor::application::ports::{
    BrokerPosition, Clock, FixedClock, LedgerPort, NotifierPort, OrderQueuePort, SettingsPort,
};
use signal_executor::application::services::{
    BrokerGateway, GatewayConfig, PollBackoff, RateLimiter, RiskEngine,
};
use signal_executor::application::use_cases::{
    ExecutionConfig, ExecutionWorker, FlushPendingUseCase, IntakeOutcome, IntakeSignalUseCase,
    ProcessOrderDeps, ProcessOrderUseCase, ReconcileUseCase, WorkerConfig,
};
use signal_executor::domain::ledger::{LotStatus, TradeStatus};
use signal_executor::domain::market_hours::MarketCalendar;
use signal_executor::domain::order_queue::Lane;
use signal_executor::domain::reconciliation::MismatchKind;
use signal_executor::domain::risk_management::RiskSettings;
use signal_executor::domain::shared::OrderSide;
use signal_executor::domain::signal::SignalRequest;
use signal_executor::infrastructure::broker::MockBroker;
use signal_executor::infrastructure::notifications::RecordingNotifier;
use signal_executor::infrastructure::persistence::{
    SqliteIntakeStore, SqliteLedger, SqliteOrderQueue, SqliteSettings, connect_in_memory,
};

type Worker = ExecutionWorker<MockBroker, SqliteLedger, SqliteOrderQueue, SqliteSettings>;

/// Monday 2026-03-02 10:00 New York.
fn monday_open() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
}

/// Saturday 2026-03-07 12:00 New York.
fn saturday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 7, 17, 0, 0).unwrap()
}

/// Monday 2026-03-09 09:45 New York (daylight time).
fn next_monday_open() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 9, 13, 45, 0).unwrap()
}

struct Pipeline {
    intake: IntakeSignalUseCase<SqliteIntakeStore>,
    worker: Worker,
    flush: FlushPendingUseCase<SqliteOrderQueue>,
    reconcile: ReconcileUseCase<MockBroker, SqliteLedger>,
    broker: Arc<MockBroker>,
    queue: Arc<SqliteOrderQueue>,
    ledger: Arc<SqliteLedger>,
    settings: Arc<SqliteSettings>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<FixedClock>,
}

async fn pipeline(settings: RiskSettings) -> Pipeline {
    let pool = connect_in_memory().await.unwrap();
    let broker = Arc::new(MockBroker::new());
    let gateway = BrokerGateway::new(
        Arc::clone(&broker),
        GatewayConfig {
            fill_poll_interval: Duration::from_millis(10),
            order_timeout: Duration::from_millis(50),
            ..GatewayConfig::default()
        },
    );
    gateway.connect().await.unwrap();

    let ledger = Arc::new(SqliteLedger::new(pool.clone()));
    let queue = Arc::new(SqliteOrderQueue::new(pool.clone()));
    let store = Arc::new(SqliteIntakeStore::new(pool.clone()));
    let settings_store = Arc::new(SqliteSettings::new(pool));
    settings_store.seed(&settings).await.unwrap();

    let notifier = Arc::new(RecordingNotifier::new());
    let notifier_port: Arc<dyn NotifierPort> = notifier.clone();
    let clock = Arc::new(FixedClock::new(monday_open()));
    let clock_port: Arc<dyn Clock> = clock.clone();
    let calendar = Arc::new(MarketCalendar::nyse());

    let engine = ProcessOrderUseCase::new(
        ProcessOrderDeps {
            risk: Arc::new(RiskEngine::standard(gateway.clone(), Arc::clone(&ledger))),
            gateway: gateway.clone(),
            ledger: Arc::clone(&ledger),
            queue: Arc::clone(&queue),
            settings: Arc::clone(&settings_store),
            calendar,
            rate_limiter: Arc::new(RateLimiter::per_second(1000)),
            notifier: Arc::clone(&notifier_port),
            clock: Arc::clone(&clock_port),
        },
        ExecutionConfig::default(),
    );
    let worker = ExecutionWorker::new(
        Arc::new(engine),
        Arc::clone(&queue),
        gateway.clone(),
        Arc::clone(&notifier_port),
        WorkerConfig::default(),
    );

    Pipeline {
        intake: IntakeSignalUseCase::new(store, Arc::clone(&clock_port)),
        worker,
        flush: FlushPendingUseCase::new(Arc::clone(&queue), notifier_port),
        reconcile: ReconcileUseCase::new(gateway, Arc::clone(&ledger), clock_port),
        broker,
        queue,
        ledger,
        settings: settings_store,
        notifier,
        clock,
    }
}

fn signal(action: &str, ticker: &str, key: &str) -> SignalRequest {
    SignalRequest {
        action: action.to_string(),
        ticker: ticker.to_string(),
        price: None,
        idempotency_key: Some(key.to_string()),
        source: Some("integration".to_string()),
    }
}

impl Pipeline {
    /// Run the worker until the queue is idle.
    async fn drain(&self) {
        let mut backoff = PollBackoff::new(Duration::from_millis(1), Duration::from_millis(2));
        for _ in 0..20 {
            let active = self.queue.stats().await.unwrap();
            if active.buy + active.sell == 0 {
                return;
            }
            self.worker.step(&mut backoff).await;
        }
        panic!("queue did not drain");
    }
}

#[tokio::test]
async fn buy_then_sell_closes_the_lot() {
    let p = pipeline(RiskSettings::default()).await;
    p.broker.set_price("AAPL", dec!(200));

    let outcome = p.intake.execute(&signal("BUY", "NASDAQ:AAPL", "alert-1")).await.unwrap();
    assert!(matches!(outcome, IntakeOutcome::Queued { lane: Lane::Buy, .. }));
    p.drain().await;

    let lots = p.ledger.all_open_lots().await.unwrap();
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].qty, dec!(1.5));
    assert_eq!(lots[0].entry_price, dec!(200));

    p.broker.set_price("AAPL", dec!(210));
    p.clock.advance(chrono::Duration::seconds(600));
    p.intake.execute(&signal("SELL", "AAPL", "alert-2")).await.unwrap();
    p.drain().await;

    assert!(p.ledger.all_open_lots().await.unwrap().is_empty());
    let trades = p.ledger.recent_trades(10).await.unwrap();
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].side, OrderSide::Sell);
    assert_eq!(trades[0].status, TradeStatus::Filled);
    assert_eq!(trades[0].pnl, Some(dec!(15)));

    let submitted = p.broker.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[0].client_order_id.as_str(), "alert-1");
    assert_eq!(submitted[1].client_order_id.as_str(), "alert-2");
    assert_eq!(submitted[1].quantity, dec!(1.5));
}

#[tokio::test]
async fn sells_run_before_earlier_buys() {
    let p = pipeline(RiskSettings::default()).await;
    p.broker.set_price("MSFT", dec!(100));
    p.intake.execute(&signal("BUY", "MSFT", "seed")).await.unwrap();
    p.drain().await;

    p.intake.execute(&signal("BUY", "NVDA", "b-1")).await.unwrap();
    p.intake.execute(&signal("BUY", "TSLA", "b-2")).await.unwrap();
    p.intake.execute(&signal("SELL", "MSFT", "s-1")).await.unwrap();
    p.drain().await;

    let order: Vec<String> = p
        .broker
        .submitted()
        .iter()
        .skip(1)
        .map(|r| r.client_order_id.as_str().to_string())
        .collect();
    assert_eq!(order, vec!["s-1", "b-1", "b-2"]);
}

#[tokio::test]
async fn duplicate_signal_reaches_broker_once() {
    let p = pipeline(RiskSettings::default()).await;

    p.intake.execute(&signal("BUY", "AAPL", "dup")).await.unwrap();
    let again = p.intake.execute(&signal("BUY", "AAPL", "dup")).await.unwrap();
    assert!(matches!(again, IntakeOutcome::Duplicate { .. }));
    assert_eq!(p.queue.stats().await.unwrap().total(), 1);

    p.drain().await;
    assert_eq!(p.broker.submit_count(), 1);
}

#[tokio::test]
async fn weekend_signal_parks_until_open() {
    let p = pipeline(RiskSettings::default()).await;
    p.clock.set(saturday());

    p.intake.execute(&signal("BUY", "AAPL", "weekend")).await.unwrap();
    p.drain().await;

    let stats = p.queue.stats().await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(p.broker.submit_count(), 0);
    assert!(
        p.notifier
            .messages()
            .iter()
            .any(|m| m.contains("queued for market open"))
    );

    p.clock.set(next_monday_open());
    assert_eq!(p.flush.execute().await.unwrap(), 1);
    p.drain().await;

    assert_eq!(p.broker.submit_count(), 1);
    assert_eq!(p.queue.stats().await.unwrap().total(), 0);
    assert_eq!(p.ledger.open_lot_count().await.unwrap(), 1);
}

#[tokio::test]
async fn paused_blocks_buys_but_not_sells() {
    let p = pipeline(RiskSettings::default()).await;
    p.intake.execute(&signal("BUY", "AMD", "b-1")).await.unwrap();
    p.drain().await;
    assert_eq!(p.broker.submit_count(), 1);

    p.settings.set_paused(true).await.unwrap();
    p.clock.advance(chrono::Duration::seconds(60));
    p.intake.execute(&signal("BUY", "AMD", "b-2")).await.unwrap();
    p.intake.execute(&signal("SELL", "AMD", "s-1")).await.unwrap();
    p.drain().await;

    let submitted: Vec<String> = p
        .broker
        .submitted()
        .iter()
        .map(|r| r.client_order_id.as_str().to_string())
        .collect();
    assert_eq!(submitted, vec!["b-1", "s-1"]);
    assert!(p.ledger.all_open_lots().await.unwrap().is_empty());
    assert!(
        p.notifier
            .messages()
            .iter()
            .any(|m| m.contains("paused"))
    );
}

#[tokio::test]
async fn reconciliation_reports_broker_drift() {
    let p = pipeline(RiskSettings::default()).await;
    p.broker.set_price("AAPL", dec!(100));
    p.intake.execute(&signal("BUY", "AAPL", "b-1")).await.unwrap();
    p.drain().await;

    p.broker.set_positions(vec![
        BrokerPosition {
            ticker: "AAPL".to_string(),
            qty: dec!(3),
            avg_cost: dec!(100),
        },
        BrokerPosition {
            ticker: "GME".to_string(),
            qty: dec!(10),
            avg_cost: dec!(20),
        },
    ]);

    let result = p.reconcile.execute().await.unwrap();
    assert_eq!(result.tickers_checked, 2);
    assert_eq!(result.mismatches.len(), 1);
    assert_eq!(result.mismatches[0].ticker, "GME");
    assert_eq!(result.mismatches[0].kind, MismatchKind::BrokerOnly);

    let lots = p.ledger.all_open_lots().await.unwrap();
    assert_eq!(lots[0].status, LotStatus::Open);
    assert_eq!(lots[0].qty, dec!(3));
    assert_eq!(lots.iter().map(|l| l.entry_amount).sum::<Decimal>(), dec!(300));
}

#[tokio::test]
async fn share_class_spellings_close_the_same_lot() {
    let p = pipeline(RiskSettings::default()).await;
    p.broker.set_price("BRK.B", dec!(100));

    p.intake.execute(&signal("BUY", "NYSE:BRK B", "b-1")).await.unwrap();
    p.drain().await;
    let lots = p.ledger.all_open_lots().await.unwrap();
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].ticker.as_str(), "BRK.B");

    p.broker.set_positions(vec![BrokerPosition {
        ticker: "BRK.B".to_string(),
        qty: dec!(3),
        avg_cost: dec!(100),
    }]);
    assert!(p.reconcile.execute().await.unwrap().is_clean());

    p.clock.advance(chrono::Duration::seconds(60));
    p.intake.execute(&signal("SELL", "BRK.B", "s-1")).await.unwrap();
    p.drain().await;

    assert!(p.ledger.all_open_lots().await.unwrap().is_empty());
    let submitted = p.broker.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[1].quantity, dec!(3));
}
