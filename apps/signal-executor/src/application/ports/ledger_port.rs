//! Position Ledger Port (Driven Port)
//!
//! Persisted lots and trade records. Fill writes are atomic: a lot
//! change and its trade record land together or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::PersistenceError;
use crate::domain::ledger::{NewLot, NewTrade, PositionLot, SellAllocation, TradeRecord};
use crate::domain::shared::{LotId, Ticker, TradeId};

/// Port for the position ledger.
#[async_trait]
pub trait LedgerPort: Send + Sync {
    /// OPEN lots for one ticker, oldest first.
    async fn open_lots(&self, ticker: &Ticker) -> Result<Vec<PositionLot>, PersistenceError>;

    /// Every OPEN lot.
    async fn all_open_lots(&self) -> Result<Vec<PositionLot>, PersistenceError>;

    /// Count of OPEN lots.
    async fn open_lot_count(&self) -> Result<u64, PersistenceError>;

    /// Count of OPEN lots for one ticker.
    async fn open_lot_count_for(&self, ticker: &Ticker) -> Result<u64, PersistenceError>;

    /// Summed entry amount of OPEN lots.
    async fn total_invested(&self) -> Result<Decimal, PersistenceError>;

    /// BUY trades with a fill created at or after `since`.
    async fn buys_since(&self, since: DateTime<Utc>) -> Result<u64, PersistenceError>;

    /// Absolute sum of negative SELL pnl at or after `since`.
    async fn realized_loss_since(&self, since: DateTime<Utc>) -> Result<Decimal, PersistenceError>;

    /// Create a lot and its BUY trade atomically.
    async fn record_buy_fill(
        &self,
        lot: NewLot,
        trade: NewTrade,
    ) -> Result<(LotId, TradeId), PersistenceError>;

    /// Close (or split) the allocated lots and write the SELL trade atomically.
    ///
    /// The trade's `lot_ids` are replaced with the closed lots.
    async fn record_sell_fill(
        &self,
        allocation: &SellAllocation,
        exit_time: DateTime<Utc>,
        trade: NewTrade,
    ) -> Result<TradeId, PersistenceError>;

    /// Append a trade record with no lot changes.
    async fn record_trade(&self, trade: NewTrade) -> Result<TradeId, PersistenceError>;

    /// Most recent trades, newest first.
    async fn recent_trades(&self, limit: u32) -> Result<Vec<TradeRecord>, PersistenceError>;
}
