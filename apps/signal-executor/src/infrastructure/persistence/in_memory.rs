//! In-memory storage adapters for testing.
//!
//! Same semantics as the SQLite adapters, without a database. Every
//! operation takes one lock, so multi-row writes are atomic here too.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::application::ports::{
    IntakeInsert, IntakeStorePort, LedgerPort, OrderQueuePort, PersistenceError, SettingsPort,
};
use crate::domain::ledger::{
    LotStatus, NewLot, NewTrade, PositionLot, SellAllocation, TradeRecord,
};
use crate::domain::order_queue::{Lane, QueueStats, QueuedOrder};
use crate::domain::risk_management::RiskSettings;
use crate::domain::shared::{LotId, OrderSide, Ticker, TradeId};
use crate::domain::signal::Signal;

// ============================================================================
// Ledger
// ============================================================================

#[derive(Debug, Default)]
struct LedgerState {
    lots: Vec<PositionLot>,
    trades: Vec<TradeRecord>,
}

impl LedgerState {
    fn next_lot_id(&self) -> LotId {
        LotId::new(self.lots.len() as i64 + 1)
    }

    fn push_trade(&mut self, trade: NewTrade, lot_ids: Vec<LotId>) -> TradeId {
        let id = TradeId::new(self.trades.len() as i64 + 1);
        self.trades.push(TradeRecord {
            id,
            ticker: trade.ticker,
            side: trade.side,
            requested_qty: trade.requested_qty,
            filled_qty: trade.filled_qty,
            requested_amount: trade.requested_amount,
            fill_price: trade.fill_price,
            commission: trade.commission,
            broker_order_id: trade.broker_order_id,
            status: trade.status,
            lot_ids,
            pnl: trade.pnl,
            error: trade.error,
            idempotency_key: trade.idempotency_key,
            created_at: trade.created_at,
        });
        id
    }
}

/// In-memory implementation of [`LedgerPort`].
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
    fail_writes: AtomicBool,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail (for divergence tests).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every lot.
    #[must_use]
    pub fn lots(&self) -> Vec<PositionLot> {
        self.read().lots.clone()
    }

    /// Snapshot of every trade, oldest first.
    #[must_use]
    pub fn trades(&self) -> Vec<TradeRecord> {
        self.read().trades.clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, LedgerState>, PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Connection(
                "ledger unavailable".to_string(),
            ));
        }
        Ok(self.state.write().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl LedgerPort for InMemoryLedger {
    async fn open_lots(&self, ticker: &Ticker) -> Result<Vec<PositionLot>, PersistenceError> {
        let mut lots: Vec<PositionLot> = self
            .read()
            .lots
            .iter()
            .filter(|l| l.is_open() && &l.ticker == ticker)
            .cloned()
            .collect();
        lots.sort_by(|a, b| a.entry_time.cmp(&b.entry_time).then(a.id.cmp(&b.id)));
        Ok(lots)
    }

    async fn all_open_lots(&self) -> Result<Vec<PositionLot>, PersistenceError> {
        Ok(self.read().lots.iter().filter(|l| l.is_open()).cloned().collect())
    }

    async fn open_lot_count(&self) -> Result<u64, PersistenceError> {
        Ok(self.read().lots.iter().filter(|l| l.is_open()).count() as u64)
    }

    async fn open_lot_count_for(&self, ticker: &Ticker) -> Result<u64, PersistenceError> {
        Ok(self
            .read()
            .lots
            .iter()
            .filter(|l| l.is_open() && &l.ticker == ticker)
            .count() as u64)
    }

    async fn total_invested(&self) -> Result<Decimal, PersistenceError> {
        Ok(self
            .read()
            .lots
            .iter()
            .filter(|l| l.is_open())
            .map(|l| l.entry_amount)
            .sum())
    }

    async fn buys_since(&self, since: DateTime<Utc>) -> Result<u64, PersistenceError> {
        Ok(self
            .read()
            .trades
            .iter()
            .filter(|t| t.side == OrderSide::Buy && t.status.has_fill() && t.created_at >= since)
            .count() as u64)
    }

    async fn realized_loss_since(&self, since: DateTime<Utc>) -> Result<Decimal, PersistenceError> {
        let loss: Decimal = self
            .read()
            .trades
            .iter()
            .filter(|t| t.side == OrderSide::Sell && t.status.has_fill() && t.created_at >= since)
            .filter_map(|t| t.pnl)
            .filter(|p| *p < Decimal::ZERO)
            .sum();
        Ok(loss.abs())
    }

    async fn record_buy_fill(
        &self,
        lot: NewLot,
        trade: NewTrade,
    ) -> Result<(LotId, TradeId), PersistenceError> {
        let mut state = self.write()?;
        let lot_id = state.next_lot_id();
        let entry_amount = lot.entry_amount();
        state.lots.push(PositionLot {
            id: lot_id,
            ticker: lot.ticker,
            qty: lot.qty,
            entry_price: lot.entry_price,
            entry_amount,
            entry_time: lot.entry_time,
            entry_order_id: lot.entry_order_id,
            status: LotStatus::Open,
            exit_price: None,
            exit_amount: None,
            exit_time: None,
            pnl: None,
            pnl_pct: None,
        });
        let trade_id = state.push_trade(trade, vec![lot_id]);
        Ok((lot_id, trade_id))
    }

    async fn record_sell_fill(
        &self,
        allocation: &SellAllocation,
        exit_time: DateTime<Utc>,
        trade: NewTrade,
    ) -> Result<TradeId, PersistenceError> {
        let mut state = self.write()?;

        for close in &allocation.closes {
            let open = state
                .lots
                .iter()
                .any(|l| l.id == close.lot_id && l.is_open() && l.qty == close.lot_qty);
            if !open {
                return Err(PersistenceError::Integrity(format!(
                    "lot {} is not open with qty {}",
                    close.lot_id, close.lot_qty
                )));
            }
        }

        let mut closed_ids = Vec::with_capacity(allocation.closes.len());
        for close in &allocation.closes {
            let closed = PositionLot {
                status: LotStatus::Closed,
                qty: close.close_qty,
                entry_amount: close.entry_amount,
                exit_price: Some(allocation.exit_price),
                exit_amount: Some(close.exit_amount),
                exit_time: Some(exit_time),
                pnl: Some(close.pnl),
                pnl_pct: Some(close.pnl_pct),
                ..state
                    .lots
                    .iter()
                    .find(|l| l.id == close.lot_id)
                    .cloned()
                    .ok_or_else(|| PersistenceError::NotFound(close.lot_id.to_string()))?
            };

            if close.is_split() {
                let new_id = state.next_lot_id();
                if let Some(open) = state.lots.iter_mut().find(|l| l.id == close.lot_id) {
                    open.qty = close.remaining_qty;
                    open.entry_amount = close.remaining_entry_amount;
                }
                state.lots.push(PositionLot {
                    id: new_id,
                    ..closed
                });
                closed_ids.push(new_id);
            } else {
                if let Some(lot) = state.lots.iter_mut().find(|l| l.id == close.lot_id) {
                    *lot = closed;
                }
                closed_ids.push(close.lot_id);
            }
        }

        Ok(state.push_trade(trade, closed_ids))
    }

    async fn record_trade(&self, trade: NewTrade) -> Result<TradeId, PersistenceError> {
        let mut state = self.write()?;
        let lot_ids = trade.lot_ids.clone();
        Ok(state.push_trade(trade, lot_ids))
    }

    async fn recent_trades(&self, limit: u32) -> Result<Vec<TradeRecord>, PersistenceError> {
        Ok(self
            .read()
            .trades
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Order queue
// ============================================================================

#[derive(Debug, Default)]
struct QueueState {
    last_seq: i64,
    entries: Vec<(Lane, QueuedOrder)>,
}

/// In-memory implementation of [`OrderQueuePort`].
#[derive(Debug, Default)]
pub struct InMemoryOrderQueue {
    state: Mutex<QueueState>,
}

impl InMemoryOrderQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders in `lane`, oldest first.
    #[must_use]
    pub fn lane(&self, lane: Lane) -> Vec<QueuedOrder> {
        let state = self.lock();
        let mut orders: Vec<QueuedOrder> = state
            .entries
            .iter()
            .filter(|(l, _)| *l == lane)
            .map(|(_, o)| o.clone())
            .collect();
        orders.sort_by_key(|o| o.seq);
        orders
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, lane: Lane, order: &QueuedOrder, reason: Option<&str>) -> i64 {
        let mut state = self.lock();
        let seq = match order.seq {
            Some(seq) => seq,
            None => {
                state.last_seq += 1;
                state.last_seq
            }
        };
        state.last_seq = state.last_seq.max(seq);
        state.entries.push((
            lane,
            QueuedOrder {
                seq: Some(seq),
                pending_reason: reason.map(str::to_string),
                ..order.clone()
            },
        ));
        seq
    }

    fn push_new(&self, order: &QueuedOrder) -> i64 {
        self.push(
            order.active_lane(),
            &QueuedOrder {
                seq: None,
                ..order.clone()
            },
            None,
        )
    }
}

#[async_trait]
impl OrderQueuePort for InMemoryOrderQueue {
    async fn enqueue(&self, order: &QueuedOrder) -> Result<i64, PersistenceError> {
        Ok(self.push_new(order))
    }

    async fn dequeue(&self) -> Result<Option<QueuedOrder>, PersistenceError> {
        let mut state = self.lock();
        for lane in [Lane::Sell, Lane::Buy] {
            let next = state
                .entries
                .iter()
                .enumerate()
                .filter(|(_, (l, _))| *l == lane)
                .min_by_key(|(_, (_, o))| o.seq)
                .map(|(i, _)| i);
            if let Some(index) = next {
                return Ok(Some(state.entries.remove(index).1));
            }
        }
        Ok(None)
    }

    async fn park_pending(
        &self,
        order: &QueuedOrder,
        reason: &str,
    ) -> Result<(), PersistenceError> {
        self.push(Lane::Pending, order, Some(reason));
        Ok(())
    }

    async fn requeue(&self, order: &QueuedOrder) -> Result<(), PersistenceError> {
        self.push(order.active_lane(), order, None);
        Ok(())
    }

    async fn flush_pending(&self) -> Result<u64, PersistenceError> {
        let mut state = self.lock();
        let mut moved = 0;
        for (lane, order) in &mut state.entries {
            if *lane == Lane::Pending {
                *lane = order.active_lane();
                order.pending_reason = None;
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn stats(&self) -> Result<QueueStats, PersistenceError> {
        let state = self.lock();
        let count = |lane: Lane| state.entries.iter().filter(|(l, _)| *l == lane).count() as u64;
        Ok(QueueStats {
            sell: count(Lane::Sell),
            buy: count(Lane::Buy),
            pending: count(Lane::Pending),
        })
    }

    async fn clear_all(&self) -> Result<u64, PersistenceError> {
        let mut state = self.lock();
        let removed = state.entries.len() as u64;
        state.entries.clear();
        Ok(removed)
    }
}

// ============================================================================
// Intake audit
// ============================================================================

/// In-memory implementation of [`IntakeStorePort`].
#[derive(Debug)]
pub struct InMemoryIntakeStore {
    queue: Arc<InMemoryOrderQueue>,
    audit: Mutex<(HashSet<String>, Vec<Signal>)>,
}

impl InMemoryIntakeStore {
    /// Create a store that enqueues into `queue`.
    #[must_use]
    pub fn new(queue: Arc<InMemoryOrderQueue>) -> Self {
        Self {
            queue,
            audit: Mutex::new((HashSet::new(), Vec::new())),
        }
    }

    /// Audit rows written so far.
    #[must_use]
    pub fn audit_rows(&self) -> Vec<Signal> {
        self.audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .1
            .clone()
    }
}

#[async_trait]
impl IntakeStorePort for InMemoryIntakeStore {
    async fn record_and_enqueue(
        &self,
        signal: &Signal,
        order: &QueuedOrder,
    ) -> Result<IntakeInsert, PersistenceError> {
        let mut audit = self.audit.lock().unwrap_or_else(PoisonError::into_inner);
        if !audit.0.insert(signal.idempotency_key.as_str().to_string()) {
            return Ok(IntakeInsert::Duplicate);
        }
        audit.1.push(signal.clone());
        let seq = self.queue.push_new(order);
        Ok(IntakeInsert::Inserted { seq })
    }
}

// ============================================================================
// Settings
// ============================================================================

/// In-memory implementation of [`SettingsPort`].
#[derive(Debug, Default)]
pub struct InMemorySettings {
    settings: RwLock<RiskSettings>,
    fail_loads: AtomicBool,
}

impl InMemorySettings {
    /// Start from `settings`.
    #[must_use]
    pub fn new(settings: RiskSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
            fail_loads: AtomicBool::new(false),
        }
    }

    /// Make `load` fail.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RiskSettings> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SettingsPort for InMemorySettings {
    async fn load(&self) -> Result<RiskSettings, PersistenceError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(PersistenceError::Connection(
                "settings unavailable".to_string(),
            ));
        }
        Ok(self
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn save(&self, settings: &RiskSettings) -> Result<(), PersistenceError> {
        *self.write() = settings.clone();
        Ok(())
    }

    async fn set_paused(&self, paused: bool) -> Result<(), PersistenceError> {
        self.write().paused = paused;
        Ok(())
    }

    async fn set_killed(&self, killed: bool) -> Result<(), PersistenceError> {
        self.write().killed = killed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::{TradeStatus, allocate_sell};
    use crate::domain::shared::IdempotencyKey;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, minute, 0).unwrap()
    }

    fn ticker(s: &str) -> Ticker {
        Ticker::parse(s).unwrap()
    }

    fn order(side: OrderSide, symbol: &str, key: &str) -> QueuedOrder {
        QueuedOrder {
            seq: None,
            action: side,
            ticker: ticker(symbol),
            idempotency_key: IdempotencyKey::new(key),
            enqueued_at: t(0),
            pending_reason: None,
        }
    }

    fn filled(side: OrderSide, symbol: &str, qty: Decimal, price: Decimal, at: DateTime<Utc>) -> NewTrade {
        NewTrade {
            status: TradeStatus::Filled,
            filled_qty: qty,
            fill_price: Some(price),
            error: None,
            ..NewTrade::failed(ticker(symbol), side, "", at)
        }
    }

    async fn buy(ledger: &InMemoryLedger, symbol: &str, qty: Decimal, price: Decimal, at: DateTime<Utc>) {
        let lot = NewLot {
            ticker: ticker(symbol),
            qty,
            entry_price: price,
            entry_time: at,
            entry_order_id: None,
        };
        ledger
            .record_buy_fill(lot, filled(OrderSide::Buy, symbol, qty, price, at))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sell_lane_is_served_first() {
        let queue = InMemoryOrderQueue::new();
        queue.enqueue(&order(OrderSide::Buy, "AAPL", "b1")).await.unwrap();
        queue.enqueue(&order(OrderSide::Sell, "MSFT", "s1")).await.unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        let second = queue.dequeue().await.unwrap().unwrap();

        assert_eq!(first.idempotency_key.as_str(), "s1");
        assert_eq!(second.idempotency_key.as_str(), "b1");
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn flush_moves_pending_to_active_lanes() {
        let queue = InMemoryOrderQueue::new();
        queue
            .park_pending(&order(OrderSide::Buy, "AAPL", "b1"), "Market closed")
            .await
            .unwrap();
        queue
            .park_pending(&order(OrderSide::Sell, "AAPL", "s1"), "Market closed")
            .await
            .unwrap();
        assert_eq!(queue.lane(Lane::Pending)[0].pending_reason.as_deref(), Some("Market closed"));

        assert_eq!(queue.flush_pending().await.unwrap(), 2);

        let stats = queue.stats().await.unwrap();
        assert_eq!((stats.sell, stats.buy, stats.pending), (1, 1, 0));
        assert!(queue.lane(Lane::Buy)[0].pending_reason.is_none());
    }

    #[tokio::test]
    async fn requeue_keeps_position() {
        let queue = InMemoryOrderQueue::new();
        queue.enqueue(&order(OrderSide::Buy, "AAPL", "b1")).await.unwrap();
        queue.enqueue(&order(OrderSide::Buy, "AAPL", "b2")).await.unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        queue.requeue(&first).await.unwrap();

        let again = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(again.idempotency_key.as_str(), "b1");
    }

    #[tokio::test]
    async fn intake_store_rejects_known_keys() {
        let queue = Arc::new(InMemoryOrderQueue::new());
        let store = InMemoryIntakeStore::new(Arc::clone(&queue));
        let signal = Signal::from_request(
            &crate::domain::signal::SignalRequest {
                action: "BUY".to_string(),
                ticker: "AAPL".to_string(),
                price: None,
                idempotency_key: Some("k1".to_string()),
                source: None,
            },
            t(0),
        )
        .unwrap();
        let queued = QueuedOrder::from_signal(&signal);

        assert!(matches!(
            store.record_and_enqueue(&signal, &queued).await.unwrap(),
            IntakeInsert::Inserted { .. }
        ));
        assert_eq!(
            store.record_and_enqueue(&signal, &queued).await.unwrap(),
            IntakeInsert::Duplicate
        );
        assert_eq!(queue.stats().await.unwrap().total(), 1);
        assert_eq!(store.audit_rows().len(), 1);
    }

    #[tokio::test]
    async fn sell_closes_every_lot() {
        let ledger = InMemoryLedger::new();
        buy(&ledger, "X", dec!(10), dec!(10), t(0)).await;
        buy(&ledger, "X", dec!(5), dec!(12), t(1)).await;

        let lots = ledger.open_lots(&ticker("X")).await.unwrap();
        let allocation = allocate_sell(&lots, dec!(15), dec!(11));
        let trade_id = ledger
            .record_sell_fill(&allocation, t(5), filled(OrderSide::Sell, "X", dec!(15), dec!(11), t(5)))
            .await
            .unwrap();

        assert_eq!(ledger.open_lot_count_for(&ticker("X")).await.unwrap(), 0);
        let closed = ledger.lots();
        assert_eq!(closed[0].pnl, Some(dec!(10)));
        assert_eq!(closed[1].pnl, Some(dec!(-5)));
        let trade = &ledger.trades()[trade_id.value() as usize - 1];
        assert_eq!(trade.lot_ids, vec![LotId::new(1), LotId::new(2)]);
    }

    #[tokio::test]
    async fn split_sell_keeps_remainder_open() {
        let ledger = InMemoryLedger::new();
        buy(&ledger, "X", dec!(10), dec!(10), t(0)).await;

        let lots = ledger.open_lots(&ticker("X")).await.unwrap();
        let allocation = allocate_sell(&lots, dec!(4), dec!(11));
        ledger
            .record_sell_fill(&allocation, t(5), filled(OrderSide::Sell, "X", dec!(4), dec!(11), t(5)))
            .await
            .unwrap();

        let open = ledger.open_lots(&ticker("X")).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].qty, dec!(6));
        assert_eq!(open[0].entry_amount, dec!(60));
        assert_eq!(ledger.total_invested().await.unwrap(), dec!(60));

        let closed: Vec<_> = ledger.lots().into_iter().filter(|l| !l.is_open()).collect();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].qty, dec!(4));
        assert_eq!(closed[0].pnl, Some(dec!(4)));
    }

    #[tokio::test]
    async fn stale_allocation_is_rejected() {
        let ledger = InMemoryLedger::new();
        buy(&ledger, "X", dec!(10), dec!(10), t(0)).await;
        let lots = ledger.open_lots(&ticker("X")).await.unwrap();
        let allocation = allocate_sell(&lots, dec!(10), dec!(11));
        let sell = filled(OrderSide::Sell, "X", dec!(10), dec!(11), t(5));

        ledger.record_sell_fill(&allocation, t(5), sell.clone()).await.unwrap();
        let err = ledger.record_sell_fill(&allocation, t(6), sell).await.unwrap_err();

        assert!(matches!(err, PersistenceError::Integrity(_)));
        assert_eq!(ledger.trades().len(), 2);
    }

    #[tokio::test]
    async fn write_failures_leave_no_trace() {
        let ledger = InMemoryLedger::new();
        ledger.set_fail_writes(true);
        let lot = NewLot {
            ticker: ticker("X"),
            qty: dec!(1),
            entry_price: dec!(1),
            entry_time: t(0),
            entry_order_id: None,
        };
        assert!(
            ledger
                .record_buy_fill(lot, filled(OrderSide::Buy, "X", dec!(1), dec!(1), t(0)))
                .await
                .is_err()
        );
        assert!(ledger.lots().is_empty());
        assert!(ledger.trades().is_empty());
    }

    #[tokio::test]
    async fn settings_flags_apply_immediately() {
        let settings = InMemorySettings::new(RiskSettings::default());
        settings.set_paused(true).await.unwrap();
        settings.set_killed(true).await.unwrap();
        let loaded = settings.load().await.unwrap();
        assert!(loaded.paused && loaded.killed);
    }
}
