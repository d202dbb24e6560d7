//! Process Order Use Case
//!
//! The execution engine: takes one dequeued order through the hours
//! gate, the risk chain, the rate limiter, and the broker, then records
//! the result in the ledger and tells the operator.
//!
//! ```text
//! Dequeued -> HoursCheck -> RiskCheck -> RateLimited -> Submitted
//!          -> {Filled | Unfilled} -> Recorded -> Notified
//! ```
//!
//! Orders that cannot reach the broker before submission are put back in
//! their lane (`Deferred`) rather than failed. Once an order is submitted
//! its outcome is always written to the ledger; a ledger write failure
//! after a fill is logged as critical and escalated.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::application::ports::{
    BrokerPort, Clock, LedgerPort, NotifierPort, OrderQueuePort, SettingsPort, notify_best_effort,
};
use crate::application::services::{
    BrokerGateway, FillResult, GatewayError, RateLimiter, RiskEngine,
};
use crate::domain::ledger::{NewLot, NewTrade, PositionLot, TradeStatus, allocate_sell};
use crate::domain::market_hours::MarketCalendar;
use crate::domain::order_queue::QueuedOrder;
use crate::domain::risk_management::{RiskSettings, RiskVerdict};
use crate::domain::shared::{BrokerOrderId, LotId, OrderSide, Ticker};
use crate::error::ErrorKind;
use crate::observability::{record_ledger_divergence, record_order_outcome};

/// Execution tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Decimal places kept on computed BUY quantities.
    pub qty_decimals: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { qty_decimals: 4 }
    }
}

/// A filled or partially filled BUY.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuyReport {
    /// Ticker bought.
    pub ticker: Ticker,
    /// Quantity asked for.
    pub requested_qty: Decimal,
    /// Quantity filled.
    pub qty: Decimal,
    /// Average fill price.
    pub price: Decimal,
    /// `qty * price`.
    pub amount: Decimal,
    /// Commission charged.
    pub commission: Decimal,
    /// Broker order id.
    pub broker_order_id: BrokerOrderId,
    /// Whether the whole quantity filled.
    pub fully_filled: bool,
    /// Lot opened, when the ledger write succeeded.
    pub lot_id: Option<LotId>,
}

/// A filled or partially filled SELL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SellReport {
    /// Ticker sold.
    pub ticker: Ticker,
    /// Quantity asked for (all open lots).
    pub requested_qty: Decimal,
    /// Quantity filled.
    pub qty: Decimal,
    /// Average fill price.
    pub price: Decimal,
    /// Lots closed or split.
    pub lots_closed: usize,
    /// Entry amount of the sold quantity.
    pub entry_total: Decimal,
    /// Exit amount of the sold quantity.
    pub exit_total: Decimal,
    /// Realized pnl.
    pub pnl: Decimal,
    /// Realized pnl in percent of entry.
    pub pnl_pct: Decimal,
    /// Commission charged.
    pub commission: Decimal,
    /// Broker order id.
    pub broker_order_id: BrokerOrderId,
    /// Whether the whole quantity filled.
    pub fully_filled: bool,
    /// Whether the ledger write succeeded.
    pub recorded: bool,
}

/// What happened to one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Market closed; moved to the pending lane.
    Parked {
        /// Why.
        reason: String,
        /// Human-readable wait until the next open.
        next_open_in: String,
    },
    /// Market closed and parking is off; dropped.
    Skipped {
        /// Why.
        reason: String,
    },
    /// A risk check failed; dropped.
    Blocked {
        /// Failing check.
        check: String,
        /// Check's message.
        reason: String,
    },
    /// BUY filled at least in part.
    Bought(BuyReport),
    /// SELL filled at least in part.
    Sold(SellReport),
    /// SELL for a ticker without open lots; nothing sent.
    NoOpenPositions,
    /// The broker did not fill the order or refused it.
    Failed {
        /// Why.
        reason: String,
    },
    /// The broker or the store was unavailable before submission; the
    /// order is back in its lane.
    Deferred {
        /// Why.
        reason: String,
    },
}

impl ProcessOutcome {
    /// Metrics and log label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Parked { .. } => "parked",
            Self::Skipped { .. } => "skipped",
            Self::Blocked { .. } => "blocked",
            Self::Bought(_) | Self::Sold(_) => "filled",
            Self::NoOpenPositions => "no_open_positions",
            Self::Failed { .. } => "failed",
            Self::Deferred { .. } => "deferred",
        }
    }

    /// Failure class, or `None` for a clean fill.
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Parked { .. } | Self::Skipped { .. } | Self::Blocked { .. } | Self::NoOpenPositions => {
                Some(ErrorKind::Gating)
            }
            Self::Bought(BuyReport { lot_id: None, .. })
            | Self::Sold(SellReport { recorded: false, .. }) => Some(ErrorKind::Persistence),
            Self::Bought(_) | Self::Sold(_) => None,
            Self::Failed { .. } => Some(ErrorKind::BrokerBusiness),
            Self::Deferred { .. } => Some(ErrorKind::BrokerConnectivity),
        }
    }

    /// Whether the worker should back off before the next dequeue.
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }

    /// Operator message for this outcome.
    #[must_use]
    pub fn message(&self, action: OrderSide, ticker: &Ticker) -> String {
        match self {
            Self::Parked { next_open_in, .. } => {
                format!("{action} {ticker} queued for market open\nNext open: {next_open_in}")
            }
            Self::Skipped { .. } => format!("{action} {ticker} skipped (market closed)"),
            Self::Blocked { reason, .. } => format!("{action} {ticker} blocked: {reason}"),
            Self::Bought(r) => {
                let partial = if r.fully_filled { "" } else { " (partial)" };
                format!(
                    "BUY {ticker}{partial}\nQty: {} x ${:.2}\nAmount: ${:.2}\nCommission: ${:.2}",
                    r.qty, r.price, r.amount, r.commission
                )
            }
            Self::Sold(r) => {
                let partial = if r.fully_filled { "" } else { " partial" };
                format!(
                    "SELL {ticker} ({}{partial} lot(s) closed)\nQty: {} x ${:.2}\nEntry total: ${:.2}\nExit total: ${:.2}\nPnL: {} ({}%)",
                    r.lots_closed,
                    r.qty,
                    r.price,
                    r.entry_total,
                    r.exit_total,
                    signed_dollars(r.pnl),
                    signed(r.pnl_pct.round_dp(1)),
                )
            }
            Self::NoOpenPositions => format!("SELL {ticker} ignored: no open positions"),
            Self::Failed { reason } => format!("{action} {ticker} failed: {reason}"),
            Self::Deferred { reason } => format!("{action} {ticker} deferred: {reason}"),
        }
    }
}

fn signed(value: Decimal) -> String {
    if value.is_sign_negative() {
        value.to_string()
    } else {
        format!("+{value}")
    }
}

fn signed_dollars(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    if rounded.is_sign_negative() {
        format!("-${:.2}", rounded.abs())
    } else {
        format!("+${rounded:.2}")
    }
}

/// Use case for processing one dequeued order.
pub struct ProcessOrderUseCase<B, L, Q, S>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
{
    gateway: BrokerGateway<B>,
    risk: Arc<RiskEngine>,
    ledger: Arc<L>,
    queue: Arc<Q>,
    settings: Arc<S>,
    calendar: Arc<MarketCalendar>,
    rate_limiter: Arc<RateLimiter>,
    notifier: Arc<dyn NotifierPort>,
    clock: Arc<dyn Clock>,
    config: ExecutionConfig,
}

/// Collaborators of [`ProcessOrderUseCase`].
pub struct ProcessOrderDeps<B, L, Q, S>
where
    B: BrokerPort + 'static,
{
    /// Broker session.
    pub gateway: BrokerGateway<B>,
    /// Risk chain.
    pub risk: Arc<RiskEngine>,
    /// Position ledger.
    pub ledger: Arc<L>,
    /// Order queue.
    pub queue: Arc<Q>,
    /// Settings store.
    pub settings: Arc<S>,
    /// Trading calendar.
    pub calendar: Arc<MarketCalendar>,
    /// Process-wide order pacing.
    pub rate_limiter: Arc<RateLimiter>,
    /// Operator channel.
    pub notifier: Arc<dyn NotifierPort>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

impl<B, L, Q, S> ProcessOrderUseCase<B, L, Q, S>
where
    B: BrokerPort + 'static,
    L: LedgerPort,
    Q: OrderQueuePort,
    S: SettingsPort,
{
    /// Create a new ProcessOrderUseCase.
    pub fn new(deps: ProcessOrderDeps<B, L, Q, S>, config: ExecutionConfig) -> Self {
        Self {
            gateway: deps.gateway,
            risk: deps.risk,
            ledger: deps.ledger,
            queue: deps.queue,
            settings: deps.settings,
            calendar: deps.calendar,
            rate_limiter: deps.rate_limiter,
            notifier: deps.notifier,
            clock: deps.clock,
            config,
        }
    }

    /// Process one order and notify the operator of the outcome.
    pub async fn execute(&self, order: &QueuedOrder) -> ProcessOutcome {
        info!(
            action = %order.action,
            ticker = %order.ticker,
            idempotency_key = %order.idempotency_key,
            "Processing order"
        );

        let outcome = self.process(order).await;

        info!(
            action = %order.action,
            ticker = %order.ticker,
            idempotency_key = %order.idempotency_key,
            outcome = outcome.label(),
            kind = ?outcome.error_kind(),
            "Order processed"
        );
        record_order_outcome(order.action.label(), outcome.label());

        if !matches!(outcome, ProcessOutcome::Deferred { .. }) {
            notify_best_effort(
                self.notifier.as_ref(),
                &outcome.message(order.action, &order.ticker),
            )
            .await;
        }

        outcome
    }

    async fn process(&self, order: &QueuedOrder) -> ProcessOutcome {
        let settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => return self.defer(order, format!("Settings unavailable: {e}")).await,
        };
        let now = self.clock.now();

        if settings.regular_hours_only && !self.calendar.is_open(now) {
            return self.gate_closed_market(order, &settings, now).await;
        }

        match self
            .risk
            .evaluate(order.action, &order.ticker, &settings, now)
            .await
        {
            RiskVerdict::Approved => {}
            RiskVerdict::Rejected { check, reason } => {
                return ProcessOutcome::Blocked { check, reason };
            }
            RiskVerdict::Errored {
                check,
                reason,
                retryable,
            } => {
                if retryable {
                    return self.defer(order, reason).await;
                }
                return ProcessOutcome::Blocked { check, reason };
            }
        }

        match order.action {
            OrderSide::Buy => self.buy(order, &settings).await,
            OrderSide::Sell => self.sell(order).await,
        }
    }

    async fn gate_closed_market(
        &self,
        order: &QueuedOrder,
        settings: &RiskSettings,
        now: DateTime<Utc>,
    ) -> ProcessOutcome {
        let session = self.calendar.session(now);
        if !settings.queue_outside_hours {
            return ProcessOutcome::Skipped {
                reason: format!("Market {}", session.label()),
            };
        }

        let reason = format!("Market {}", session.label());
        if let Err(e) = self.queue.park_pending(order, &reason).await {
            return self.defer(order, format!("Could not park order: {e}")).await;
        }
        ProcessOutcome::Parked {
            reason,
            next_open_in: self.calendar.next_open_in(now),
        }
    }

    /// Put the order back and report it deferred.
    async fn defer(&self, order: &QueuedOrder, reason: String) -> ProcessOutcome {
        warn!(
            idempotency_key = %order.idempotency_key,
            reason = %reason,
            "Order deferred"
        );
        if let Err(e) = self.queue.requeue(order).await {
            error!(
                idempotency_key = %order.idempotency_key,
                error = %e,
                "Failed to requeue deferred order; it is lost"
            );
            return ProcessOutcome::Failed {
                reason: format!("{reason}; requeue failed: {e}"),
            };
        }
        ProcessOutcome::Deferred { reason }
    }

    /// Wait for the connection and the rate limiter before a submission.
    async fn ready_to_submit(&self, order: &QueuedOrder) -> Option<ProcessOutcome> {
        if let Err(e) = self.gateway.ensure_connected() {
            return Some(self.defer(order, e.to_string()).await);
        }
        self.rate_limiter.acquire().await;
        None
    }

    async fn buy(&self, order: &QueuedOrder, settings: &RiskSettings) -> ProcessOutcome {
        if let Some(outcome) = self.ready_to_submit(order).await {
            return outcome;
        }
        let ticker = &order.ticker;
        let amount = settings.buy_amount;

        let instrument = match self.gateway.qualify(ticker).await {
            Ok(instrument) => instrument,
            Err(e) => return self.pre_submit_failure(order, e, Some(amount), Vec::new()).await,
        };

        let price = match self.gateway.snapshot_price(&instrument).await {
            Ok(Some(price)) if price > Decimal::ZERO => price,
            Ok(_) => {
                let reason = format!("No price available for {ticker}");
                return self.record_failure(order, reason, Some(amount), None, Vec::new()).await;
            }
            Err(e) => return self.pre_submit_failure(order, e, Some(amount), Vec::new()).await,
        };

        let qty = (amount / price).round_dp(self.config.qty_decimals);
        if qty <= Decimal::ZERO {
            let reason = format!("Calculated quantity is 0 for {ticker} at ${price}");
            return self.record_failure(order, reason, Some(amount), Some(qty), Vec::new()).await;
        }

        let fill = match self
            .gateway
            .place_market_order(&instrument, OrderSide::Buy, qty, &order.idempotency_key)
            .await
        {
            Ok(fill) => fill,
            Err(e) => return self.submit_failure(order, e, Some(amount), qty, Vec::new()).await,
        };

        let Some(fill_price) = fill.fill_price() else {
            return self.record_unfilled(order, &fill, Some(amount), Vec::new()).await;
        };

        let now = self.clock.now();
        let lot = NewLot {
            ticker: ticker.clone(),
            qty: fill.filled_qty,
            entry_price: fill_price,
            entry_time: now,
            entry_order_id: Some(fill.broker_order_id.clone()),
        };
        let trade = NewTrade {
            requested_qty: Some(qty),
            filled_qty: fill.filled_qty,
            requested_amount: Some(amount),
            fill_price: Some(fill_price),
            commission: fill.commission,
            broker_order_id: Some(fill.broker_order_id.clone()),
            status: fill_status(&fill),
            error: None,
            idempotency_key: Some(order.idempotency_key.clone()),
            ..NewTrade::failed(ticker.clone(), OrderSide::Buy, "", now)
        };

        let lot_id = match self.ledger.record_buy_fill(lot, trade).await {
            Ok((lot_id, trade_id)) => {
                info!(%ticker, %lot_id, %trade_id, qty = %fill.filled_qty, price = %fill_price, "BUY recorded");
                Some(lot_id)
            }
            Err(e) => {
                self.escalate_divergence(order, &fill, &e.to_string()).await;
                None
            }
        };

        ProcessOutcome::Bought(BuyReport {
            ticker: ticker.clone(),
            requested_qty: qty,
            qty: fill.filled_qty,
            price: fill_price,
            amount: fill.filled_qty * fill_price,
            commission: fill.commission,
            broker_order_id: fill.broker_order_id,
            fully_filled: fill.fully_filled,
            lot_id,
        })
    }

    async fn sell(&self, order: &QueuedOrder) -> ProcessOutcome {
        let ticker = &order.ticker;
        let lots = match self.ledger.open_lots(ticker).await {
            Ok(lots) => lots,
            Err(e) => return self.defer(order, format!("Ledger unavailable: {e}")).await,
        };
        if lots.is_empty() {
            info!(%ticker, "No open lots to sell");
            return ProcessOutcome::NoOpenPositions;
        }

        let lot_ids: Vec<LotId> = lots.iter().map(|l| l.id).collect();
        let total_qty: Decimal = lots.iter().map(|l| l.qty).sum();
        if total_qty <= Decimal::ZERO {
            let reason = format!("Total quantity is 0 for {ticker}");
            return self.record_failure(order, reason, None, Some(total_qty), lot_ids).await;
        }

        if let Some(outcome) = self.ready_to_submit(order).await {
            return outcome;
        }

        let instrument = match self.gateway.qualify(ticker).await {
            Ok(instrument) => instrument,
            Err(e) => return self.pre_submit_failure(order, e, None, lot_ids).await,
        };

        let fill = match self
            .gateway
            .place_market_order(&instrument, OrderSide::Sell, total_qty, &order.idempotency_key)
            .await
        {
            Ok(fill) => fill,
            Err(e) => return self.submit_failure(order, e, None, total_qty, lot_ids).await,
        };

        let Some(fill_price) = fill.fill_price() else {
            return self.record_unfilled(order, &fill, None, lot_ids).await;
        };

        self.record_sell(order, &lots, &fill, fill_price, total_qty).await
    }

    async fn record_sell(
        &self,
        order: &QueuedOrder,
        lots: &[PositionLot],
        fill: &FillResult,
        fill_price: Decimal,
        requested_qty: Decimal,
    ) -> ProcessOutcome {
        let ticker = &order.ticker;
        let now = self.clock.now();
        let allocation = allocate_sell(lots, fill.filled_qty, fill_price);
        let trade = NewTrade {
            requested_qty: Some(requested_qty),
            filled_qty: fill.filled_qty,
            fill_price: Some(fill_price),
            commission: fill.commission,
            broker_order_id: Some(fill.broker_order_id.clone()),
            status: fill_status(fill),
            lot_ids: allocation.closes.iter().map(|c| c.lot_id).collect(),
            pnl: Some(allocation.total_pnl),
            error: None,
            idempotency_key: Some(order.idempotency_key.clone()),
            ..NewTrade::failed(ticker.clone(), OrderSide::Sell, "", now)
        };

        let recorded = match self.ledger.record_sell_fill(&allocation, now, trade).await {
            Ok(trade_id) => {
                info!(
                    %ticker,
                    %trade_id,
                    lots = allocation.lots_closed(),
                    qty = %fill.filled_qty,
                    pnl = %allocation.total_pnl,
                    "SELL recorded"
                );
                true
            }
            Err(e) => {
                self.escalate_divergence(order, fill, &e.to_string()).await;
                false
            }
        };

        ProcessOutcome::Sold(SellReport {
            ticker: ticker.clone(),
            requested_qty,
            qty: fill.filled_qty,
            price: fill_price,
            lots_closed: allocation.lots_closed(),
            entry_total: allocation.total_entry,
            exit_total: allocation.total_exit,
            pnl: allocation.total_pnl,
            pnl_pct: allocation.pnl_pct,
            commission: fill.commission,
            broker_order_id: fill.broker_order_id.clone(),
            fully_filled: fill.fully_filled,
            recorded,
        })
    }

    /// A broker error before anything was submitted.
    async fn pre_submit_failure(
        &self,
        order: &QueuedOrder,
        err: GatewayError,
        requested_amount: Option<Decimal>,
        lot_ids: Vec<LotId>,
    ) -> ProcessOutcome {
        if err.is_connectivity() {
            return self.defer(order, err.to_string()).await;
        }
        self.record_failure(order, err.to_string(), requested_amount, None, lot_ids)
            .await
    }

    /// A broker error from the submission itself.
    ///
    /// Only `NotConnected` guarantees nothing was sent; any other error may
    /// have reached the broker, so the order is failed, not retried.
    async fn submit_failure(
        &self,
        order: &QueuedOrder,
        err: GatewayError,
        requested_amount: Option<Decimal>,
        qty: Decimal,
        lot_ids: Vec<LotId>,
    ) -> ProcessOutcome {
        if matches!(err, GatewayError::NotConnected) {
            return self.defer(order, err.to_string()).await;
        }
        let reason = format!("Order placement failed: {err}");
        self.record_failure(order, reason, requested_amount, Some(qty), lot_ids)
            .await
    }

    async fn record_unfilled(
        &self,
        order: &QueuedOrder,
        fill: &FillResult,
        requested_amount: Option<Decimal>,
        lot_ids: Vec<LotId>,
    ) -> ProcessOutcome {
        let reason = format!("Order not filled. Status: {:?}", fill.status);
        let trade = NewTrade {
            requested_qty: Some(fill.requested_qty),
            requested_amount,
            broker_order_id: Some(fill.broker_order_id.clone()),
            status: TradeStatus::Failed,
            lot_ids,
            idempotency_key: Some(order.idempotency_key.clone()),
            ..NewTrade::failed(
                order.ticker.clone(),
                order.action,
                reason.clone(),
                self.clock.now(),
            )
        };
        self.append_failed(trade).await;
        ProcessOutcome::Failed { reason }
    }

    async fn record_failure(
        &self,
        order: &QueuedOrder,
        reason: String,
        requested_amount: Option<Decimal>,
        requested_qty: Option<Decimal>,
        lot_ids: Vec<LotId>,
    ) -> ProcessOutcome {
        warn!(
            action = %order.action,
            ticker = %order.ticker,
            reason = %reason,
            "Order failed"
        );
        let trade = NewTrade {
            requested_qty,
            requested_amount,
            lot_ids,
            idempotency_key: Some(order.idempotency_key.clone()),
            ..NewTrade::failed(
                order.ticker.clone(),
                order.action,
                reason.clone(),
                self.clock.now(),
            )
        };
        self.append_failed(trade).await;
        ProcessOutcome::Failed { reason }
    }

    async fn append_failed(&self, trade: NewTrade) {
        if let Err(e) = self.ledger.record_trade(trade).await {
            error!(error = %e, "Failed to write FAILED trade record");
        }
    }

    /// Money moved but the ledger did not record it.
    async fn escalate_divergence(&self, order: &QueuedOrder, fill: &FillResult, err: &str) {
        error!(
            severity = "critical",
            action = %order.action,
            ticker = %order.ticker,
            idempotency_key = %order.idempotency_key,
            broker_order_id = %fill.broker_order_id,
            filled_qty = %fill.filled_qty,
            error = %err,
            "Broker fill not recorded in ledger"
        );
        record_ledger_divergence(order.action.label());
        let text = format!(
            "CRITICAL: {} {} filled {} (order {}) but the ledger write failed: {err}. Reconcile manually.",
            order.action, order.ticker, fill.filled_qty, fill.broker_order_id
        );
        notify_best_effort(self.notifier.as_ref(), &text).await;
    }
}

fn fill_status(fill: &FillResult) -> TradeStatus {
    if fill.fully_filled {
        TradeStatus::Filled
    } else {
        TradeStatus::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::FixedClock;
    use crate::application::services::GatewayConfig;
    use crate::domain::order_queue::{Lane, QueuedOrder};
    use crate::domain::shared::IdempotencyKey;
    use crate::infrastructure::broker::{FillMode, MockBroker};
    use crate::infrastructure::notifications::RecordingNotifier;
    use crate::infrastructure::persistence::{InMemoryLedger, InMemoryOrderQueue, InMemorySettings};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Harness {
        engine: ProcessOrderUseCase<MockBroker, InMemoryLedger, InMemoryOrderQueue, InMemorySettings>,
        broker: Arc<MockBroker>,
        ledger: Arc<InMemoryLedger>,
        queue: Arc<InMemoryOrderQueue>,
        settings: Arc<InMemorySettings>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<FixedClock>,
    }

    /// Monday 2026-03-02 10:00 New York.
    fn market_open() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
    }

    /// Saturday 2026-03-07 12:00 New York.
    fn weekend() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 7, 17, 0, 0).unwrap()
    }

    async fn harness(settings: RiskSettings) -> Harness {
        let broker = Arc::new(MockBroker::new());
        let config = GatewayConfig {
            fill_poll_interval: Duration::from_millis(10),
            order_timeout: Duration::from_millis(50),
            ..GatewayConfig::default()
        };
        let gateway = BrokerGateway::new(Arc::clone(&broker), config);
        gateway.connect().await.unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let queue = Arc::new(InMemoryOrderQueue::new());
        let settings = Arc::new(InMemorySettings::new(settings));
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(FixedClock::new(market_open()));
        let engine = ProcessOrderUseCase::new(
            ProcessOrderDeps {
                risk: Arc::new(RiskEngine::standard(gateway.clone(), Arc::clone(&ledger))),
                gateway,
                ledger: Arc::clone(&ledger),
                queue: Arc::clone(&queue),
                settings: Arc::clone(&settings),
                calendar: Arc::new(MarketCalendar::nyse()),
                rate_limiter: Arc::new(RateLimiter::per_second(1000)),
                notifier: notifier.clone(),
                clock: clock.clone(),
            },
            ExecutionConfig::default(),
        );
        Harness {
            engine,
            broker,
            ledger,
            queue,
            settings,
            notifier,
            clock,
        }
    }

    fn order(side: OrderSide, symbol: &str, key: &str) -> QueuedOrder {
        QueuedOrder {
            seq: Some(1),
            action: side,
            ticker: Ticker::parse(symbol).unwrap(),
            idempotency_key: IdempotencyKey::new(key),
            enqueued_at: market_open(),
            pending_reason: None,
        }
    }

    #[tokio::test]
    async fn buy_opens_a_lot_at_fill_price() {
        let h = harness(RiskSettings::default()).await;
        h.broker.set_price("AAPL", dec!(200));

        let outcome = h.engine.execute(&order(OrderSide::Buy, "AAPL", "b1")).await;

        let ProcessOutcome::Bought(report) = outcome else {
            panic!("expected a buy, got {outcome:?}");
        };
        assert_eq!(report.qty, dec!(1.5));
        assert_eq!(report.amount, dec!(300));
        assert!(report.fully_filled);

        let lots = h.ledger.lots();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].entry_price, dec!(200));
        assert_eq!(h.ledger.trades()[0].status, TradeStatus::Filled);

        let submitted = h.broker.submitted();
        assert_eq!(submitted[0].client_order_id.as_str(), "b1");
        assert!(h.notifier.messages()[0].starts_with("BUY AAPL"));
    }

    #[tokio::test]
    async fn buy_quantity_rounds_to_four_places() {
        let h = harness(RiskSettings::default()).await;
        h.broker.set_price("AAPL", dec!(7));

        h.engine.execute(&order(OrderSide::Buy, "AAPL", "b1")).await;

        assert_eq!(h.broker.submitted()[0].quantity, dec!(42.8571));
    }

    #[tokio::test]
    async fn closed_market_parks_without_touching_broker() {
        let h = harness(RiskSettings::default()).await;
        h.clock.set(weekend());

        let outcome = h.engine.execute(&order(OrderSide::Buy, "AAPL", "b1")).await;

        assert!(matches!(outcome, ProcessOutcome::Parked { .. }));
        assert_eq!(h.queue.lane(Lane::Pending).len(), 1);
        assert_eq!(h.broker.submit_count(), 0);
        assert_eq!(h.broker.cash_calls(), 0);
        assert!(h.ledger.trades().is_empty());
        assert!(h.notifier.messages()[0].contains("queued for market open"));
    }

    #[tokio::test]
    async fn closed_market_skips_when_parking_is_off() {
        let h = harness(RiskSettings {
            queue_outside_hours: false,
            ..RiskSettings::default()
        })
        .await;
        h.clock.set(weekend());

        let outcome = h.engine.execute(&order(OrderSide::Sell, "AAPL", "s1")).await;

        assert!(matches!(outcome, ProcessOutcome::Skipped { .. }));
        assert_eq!(h.queue.stats().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn extended_hours_allowed_when_not_regular_only() {
        let h = harness(RiskSettings {
            regular_hours_only: false,
            ..RiskSettings::default()
        })
        .await;
        h.clock.set(weekend());

        let outcome = h.engine.execute(&order(OrderSide::Buy, "AAPL", "b1")).await;

        assert!(matches!(outcome, ProcessOutcome::Bought(_)));
    }

    #[tokio::test]
    async fn risk_block_leaves_no_trace() {
        let h = harness(RiskSettings::default()).await;
        h.settings.set_paused(true).await.unwrap();

        let outcome = h.engine.execute(&order(OrderSide::Buy, "AAPL", "b1")).await;

        assert_eq!(
            outcome,
            ProcessOutcome::Blocked {
                check: "pause".to_string(),
                reason: "Buying is paused".to_string(),
            }
        );
        assert_eq!(h.broker.submit_count(), 0);
        assert!(h.ledger.trades().is_empty());
    }

    #[tokio::test]
    async fn sell_without_lots_skips_broker() {
        let h = harness(RiskSettings::default()).await;

        let outcome = h.engine.execute(&order(OrderSide::Sell, "AAPL", "s1")).await;

        assert_eq!(outcome, ProcessOutcome::NoOpenPositions);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Gating));
        assert_eq!(h.broker.submit_count(), 0);
    }

    #[tokio::test]
    async fn sell_closes_all_lots_with_per_lot_pnl() {
        let h = harness(RiskSettings {
            buy_amount: dec!(100),
            ..RiskSettings::default()
        })
        .await;
        h.broker.set_price("X", dec!(10));
        h.engine.execute(&order(OrderSide::Buy, "X", "b1")).await;
        h.settings
            .save(&RiskSettings {
                buy_amount: dec!(60),
                ..RiskSettings::default()
            })
            .await
            .unwrap();
        h.broker.set_price("X", dec!(12));
        h.engine.execute(&order(OrderSide::Buy, "X", "b2")).await;

        h.broker.set_price("X", dec!(11));
        let outcome = h.engine.execute(&order(OrderSide::Sell, "X", "s1")).await;

        let ProcessOutcome::Sold(report) = outcome else {
            panic!("expected a sell, got {outcome:?}");
        };
        assert_eq!(report.qty, dec!(15));
        assert_eq!(report.lots_closed, 2);
        assert_eq!(report.exit_total, dec!(165));
        assert_eq!(report.entry_total, dec!(160));
        assert_eq!(report.pnl, dec!(5));
        assert!(report.recorded);

        let ticker = Ticker::parse("X").unwrap();
        assert_eq!(h.ledger.open_lot_count_for(&ticker).await.unwrap(), 0);
        let lots = h.ledger.lots();
        assert_eq!(lots[0].pnl, Some(dec!(10)));
        assert_eq!(lots[1].pnl, Some(dec!(-5)));

        let sell = h.ledger.trades().pop().unwrap();
        assert_eq!(sell.side, OrderSide::Sell);
        assert_eq!(sell.lot_ids, vec![lots[0].id, lots[1].id]);
        assert_eq!(sell.pnl, Some(dec!(5)));
    }

    #[tokio::test]
    async fn unfilled_buy_records_failed_trade() {
        let h = harness(RiskSettings::default()).await;
        h.broker.set_fill_mode(FillMode::None);

        let outcome = h.engine.execute(&order(OrderSide::Buy, "AAPL", "b1")).await;

        assert!(matches!(outcome, ProcessOutcome::Failed { .. }));
        assert!(h.ledger.lots().is_empty());
        let trades = h.ledger.trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, TradeStatus::Failed);
        assert!(trades[0].broker_order_id.is_some());
    }

    #[tokio::test]
    async fn partial_buy_records_what_filled() {
        let h = harness(RiskSettings::default()).await;
        h.broker.set_fill_mode(FillMode::Partial(dec!(0.5)));

        let outcome = h.engine.execute(&order(OrderSide::Buy, "AAPL", "b1")).await;

        let ProcessOutcome::Bought(report) = outcome else {
            panic!("expected a buy, got {outcome:?}");
        };
        assert!(!report.fully_filled);
        assert_eq!(report.qty, dec!(1.5));
        assert_eq!(h.ledger.lots()[0].qty, dec!(1.5));
        assert_eq!(h.ledger.trades()[0].status, TradeStatus::Partial);
    }

    #[tokio::test]
    async fn unknown_ticker_is_a_business_failure() {
        let h = harness(RiskSettings::default()).await;
        h.broker.mark_unknown("ZZZZ");

        let outcome = h.engine.execute(&order(OrderSide::Buy, "ZZZZ", "b1")).await;

        assert!(matches!(outcome, ProcessOutcome::Failed { ref reason } if reason.contains("ZZZZ")));
        assert_eq!(h.ledger.trades()[0].status, TradeStatus::Failed);
        assert!(h.notifier.messages()[0].contains("failed"));
    }

    #[tokio::test]
    async fn disconnected_broker_defers_order() {
        let h = harness(RiskSettings::default()).await;
        h.broker.set_offline(true);
        h.broker.set_fail_connect(true);

        let outcome = h.engine.execute(&order(OrderSide::Buy, "AAPL", "b1")).await;

        assert!(outcome.is_deferred());
        assert_eq!(h.queue.lane(Lane::Buy).len(), 1);
        assert!(h.ledger.trades().is_empty());
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn ledger_failure_after_fill_is_escalated() {
        let h = harness(RiskSettings::default()).await;
        h.ledger.set_fail_writes(true);

        let outcome = h.engine.execute(&order(OrderSide::Buy, "AAPL", "b1")).await;

        let ProcessOutcome::Bought(report) = outcome else {
            panic!("expected a buy, got {outcome:?}");
        };
        assert!(report.lot_id.is_none());
        assert!(h.notifier.messages().iter().any(|m| m.starts_with("CRITICAL")));
    }

    #[tokio::test]
    async fn settings_are_read_for_every_order() {
        let h = harness(RiskSettings::default()).await;
        assert!(matches!(
            h.engine.execute(&order(OrderSide::Buy, "AAPL", "b1")).await,
            ProcessOutcome::Bought(_)
        ));

        h.settings.set_killed(true).await.unwrap();

        assert!(matches!(
            h.engine.execute(&order(OrderSide::Sell, "AAPL", "s1")).await,
            ProcessOutcome::Blocked { .. }
        ));
    }

    #[test]
    fn sell_message_shows_signed_pnl() {
        let report = SellReport {
            ticker: Ticker::parse("X").unwrap(),
            requested_qty: dec!(15),
            qty: dec!(15),
            price: dec!(11),
            lots_closed: 2,
            entry_total: dec!(160),
            exit_total: dec!(165),
            pnl: dec!(5),
            pnl_pct: dec!(3.125),
            commission: Decimal::ZERO,
            broker_order_id: BrokerOrderId::new("o1"),
            fully_filled: true,
            recorded: true,
        };
        let text = ProcessOutcome::Sold(report).message(OrderSide::Sell, &Ticker::parse("X").unwrap());
        assert!(text.contains("PnL: +$5.00 (+3.1%)"));
    }
}
