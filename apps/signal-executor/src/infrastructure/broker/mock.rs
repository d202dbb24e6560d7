//! Mock broker for testing.
//!
//! Fills market orders from a configurable price table and records every
//! submitted request.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::application::ports::{
    BrokerError, BrokerOrderStatus, BrokerPort, BrokerPosition, Instrument, MarketOrderRequest,
    OrderAck, PriceSnapshot,
};
use crate::domain::shared::{BrokerOrderId, Ticker};

/// How the mock fills submitted orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// Filled in full on submission.
    Full,
    /// This fraction fills, the rest rests until cancelled.
    Partial(Decimal),
    /// Nothing fills.
    None,
}

#[derive(Debug, Default)]
struct Book {
    orders: HashMap<String, OrderAck>,
    submitted: Vec<MarketOrderRequest>,
}

/// Mock broker for testing.
#[derive(Debug)]
pub struct MockBroker {
    cash: RwLock<Decimal>,
    snapshots: RwLock<HashMap<String, PriceSnapshot>>,
    unknown: RwLock<HashSet<String>>,
    positions: RwLock<Vec<BrokerPosition>>,
    fill_mode: RwLock<FillMode>,
    submit_error: RwLock<Option<BrokerError>>,
    cash_error: RwLock<Option<BrokerError>>,
    fail_connect: AtomicBool,
    offline: AtomicBool,
    book: Mutex<Book>,
    cash_calls: AtomicU32,
    connect_calls: AtomicU32,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBroker {
    /// Price used when a ticker has no configured snapshot.
    pub const DEFAULT_PRICE: Decimal = dec!(100);

    /// Create a mock with $100,000 cash that fills everything in full.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cash: RwLock::new(dec!(100000)),
            snapshots: RwLock::new(HashMap::new()),
            unknown: RwLock::new(HashSet::new()),
            positions: RwLock::new(Vec::new()),
            fill_mode: RwLock::new(FillMode::Full),
            submit_error: RwLock::new(None),
            cash_error: RwLock::new(None),
            fail_connect: AtomicBool::new(false),
            offline: AtomicBool::new(false),
            book: Mutex::new(Book::default()),
            cash_calls: AtomicU32::new(0),
            connect_calls: AtomicU32::new(0),
        }
    }

    /// Start with `cash` available.
    #[must_use]
    pub fn with_cash(self, cash: Decimal) -> Self {
        self.set_cash(cash);
        self
    }

    /// Change available cash.
    pub fn set_cash(&self, cash: Decimal) {
        *write(&self.cash) = cash;
    }

    /// Set the last price for `ticker`.
    pub fn set_price(&self, ticker: &str, price: Decimal) {
        self.set_snapshot(
            ticker,
            PriceSnapshot {
                last: Some(price),
                close: Some(price),
            },
        );
    }

    /// Set the full snapshot for `ticker`.
    pub fn set_snapshot(&self, ticker: &str, snapshot: PriceSnapshot) {
        write(&self.snapshots).insert(ticker.to_string(), snapshot);
    }

    /// Make `ticker` unresolvable.
    pub fn mark_unknown(&self, ticker: &str) {
        write(&self.unknown).insert(ticker.to_string());
    }

    /// Replace the broker's position list.
    pub fn set_positions(&self, positions: Vec<BrokerPosition>) {
        *write(&self.positions) = positions;
    }

    /// Change how orders fill.
    pub fn set_fill_mode(&self, mode: FillMode) {
        *write(&self.fill_mode) = mode;
    }

    /// Fail the next submissions with `error`.
    pub fn set_submit_error(&self, error: Option<BrokerError>) {
        *write(&self.submit_error) = error;
    }

    /// Fail cash queries with `error`.
    pub fn set_cash_error(&self, error: Option<BrokerError>) {
        *write(&self.cash_error) = error;
    }

    /// Make `connect` fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make every call fail with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Requests submitted so far.
    #[must_use]
    pub fn submitted(&self) -> Vec<MarketOrderRequest> {
        self.lock_book().submitted.clone()
    }

    /// Number of submitted requests.
    #[must_use]
    pub fn submit_count(&self) -> usize {
        self.lock_book().submitted.len()
    }

    /// Number of cash queries.
    #[must_use]
    pub fn cash_calls(&self) -> u32 {
        self.cash_calls.load(Ordering::SeqCst)
    }

    /// Number of connect attempts.
    #[must_use]
    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    fn lock_book(&self) -> std::sync::MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self) -> Result<(), BrokerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionError {
                message: "connection reset".to_string(),
            });
        }
        Ok(())
    }

    fn price_of(&self, symbol: &str) -> Decimal {
        read(&self.snapshots)
            .get(symbol)
            .and_then(PriceSnapshot::usable_price)
            .unwrap_or(Self::DEFAULT_PRICE)
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl BrokerPort for MockBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionError {
                message: "connection refused".to_string(),
            });
        }
        self.check_online()
    }

    async fn qualify(&self, ticker: &Ticker) -> Result<Instrument, BrokerError> {
        self.check_online()?;
        if read(&self.unknown).contains(ticker.as_str()) {
            return Err(BrokerError::ContractNotFound {
                ticker: ticker.to_string(),
            });
        }
        Ok(Instrument {
            ticker: ticker.clone(),
            broker_symbol: ticker.as_str().to_string(),
        })
    }

    async fn snapshot(&self, instrument: &Instrument) -> Result<PriceSnapshot, BrokerError> {
        self.check_online()?;
        let price = Self::DEFAULT_PRICE;
        Ok(read(&self.snapshots)
            .get(&instrument.broker_symbol)
            .copied()
            .unwrap_or(PriceSnapshot {
                last: Some(price),
                close: Some(price),
            }))
    }

    async fn submit_market_order(
        &self,
        request: MarketOrderRequest,
    ) -> Result<OrderAck, BrokerError> {
        self.check_online()?;
        if let Some(err) = read(&self.submit_error).clone() {
            return Err(err);
        }

        let price = self.price_of(&request.instrument.broker_symbol);
        let mode = *read(&self.fill_mode);
        let (status, filled_qty) = match mode {
            FillMode::Full => (BrokerOrderStatus::Filled, request.quantity),
            FillMode::Partial(fraction) => (
                BrokerOrderStatus::PartiallyFilled,
                (request.quantity * fraction).round_dp(4),
            ),
            FillMode::None => (BrokerOrderStatus::Accepted, Decimal::ZERO),
        };

        let mut book = self.lock_book();
        let broker_order_id = BrokerOrderId::new(format!("mock-{}", book.submitted.len() + 1));
        let ack = OrderAck {
            broker_order_id: broker_order_id.clone(),
            status,
            filled_qty,
            avg_fill_price: (filled_qty > Decimal::ZERO).then_some(price),
            commission: Decimal::ZERO,
        };
        book.orders
            .insert(broker_order_id.as_str().to_string(), ack.clone());
        book.submitted.push(request);
        Ok(ack)
    }

    async fn get_order(&self, broker_order_id: &BrokerOrderId) -> Result<OrderAck, BrokerError> {
        self.check_online()?;
        self.lock_book()
            .orders
            .get(broker_order_id.as_str())
            .cloned()
            .ok_or_else(|| BrokerError::OrderNotFound {
                order_id: broker_order_id.to_string(),
            })
    }

    async fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), BrokerError> {
        self.check_online()?;
        let mut book = self.lock_book();
        let order = book
            .orders
            .get_mut(broker_order_id.as_str())
            .ok_or_else(|| BrokerError::OrderNotFound {
                order_id: broker_order_id.to_string(),
            })?;
        if !order.status.is_done() {
            order.status = BrokerOrderStatus::Canceled;
        }
        Ok(())
    }

    async fn available_cash(&self) -> Result<Decimal, BrokerError> {
        self.cash_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if let Some(err) = read(&self.cash_error).clone() {
            return Err(err);
        }
        Ok(*read(&self.cash))
    }

    async fn positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        self.check_online()?;
        Ok(read(&self.positions).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::{IdempotencyKey, OrderSide};

    fn request(qty: Decimal) -> MarketOrderRequest {
        MarketOrderRequest::new(
            IdempotencyKey::new("k1"),
            Instrument {
                ticker: Ticker::parse("AAPL").unwrap(),
                broker_symbol: "AAPL".to_string(),
            },
            OrderSide::Buy,
            qty,
        )
    }

    #[tokio::test]
    async fn full_fill_at_configured_price() {
        let broker = MockBroker::new();
        broker.set_price("AAPL", dec!(200));

        let ack = broker.submit_market_order(request(dec!(5))).await.unwrap();

        assert_eq!(ack.status, BrokerOrderStatus::Filled);
        assert_eq!(ack.filled_qty, dec!(5));
        assert_eq!(ack.avg_fill_price, Some(dec!(200)));
        assert_eq!(broker.submit_count(), 1);
    }

    #[tokio::test]
    async fn partial_fill_is_cancelled_with_fill_kept() {
        let broker = MockBroker::new();
        broker.set_fill_mode(FillMode::Partial(dec!(0.5)));

        let ack = broker.submit_market_order(request(dec!(10))).await.unwrap();
        broker.cancel_order(&ack.broker_order_id).await.unwrap();
        let after = broker.get_order(&ack.broker_order_id).await.unwrap();

        assert_eq!(after.status, BrokerOrderStatus::Canceled);
        assert_eq!(after.filled_qty, dec!(5));
    }

    #[tokio::test]
    async fn offline_broker_reports_connectivity_errors() {
        let broker = MockBroker::new();
        broker.set_offline(true);

        let err = broker.available_cash().await.unwrap_err();
        assert!(err.is_connectivity());
        assert_eq!(broker.cash_calls(), 1);
    }
}
