//! SQLite position ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use super::{
    begin_write, decimal, encode_decimal, encode_time, optional_decimal, optional_text,
    optional_time, parsed, ticker, time,
};
use crate::application::ports::{LedgerPort, PersistenceError};
use crate::domain::ledger::{
    LotStatus, NewLot, NewTrade, PositionLot, SellAllocation, TradeRecord,
};
use crate::domain::shared::{BrokerOrderId, IdempotencyKey, LotId, Ticker, TradeId};

const LOT_COLUMNS: &str = "id, ticker, qty, entry_price, entry_amount, entry_time, \
     entry_order_id, status, exit_price, exit_amount, exit_time, pnl, pnl_pct";

const TRADE_COLUMNS: &str = "id, ticker, side, requested_qty, filled_qty, requested_amount, \
     fill_price, commission, broker_order_id, status, pnl, error, idempotency_key, created_at";

/// [`LedgerPort`] backed by the `position_lots`, `trades` and
/// `trade_lots` tables.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Create a ledger on `pool`.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_trade(
        tx: &mut Transaction<'_, Sqlite>,
        trade: &NewTrade,
        lot_ids: &[LotId],
    ) -> Result<TradeId, PersistenceError> {
        let id = sqlx::query(
            r"
            INSERT INTO trades (
                ticker, side, requested_qty, filled_qty, requested_amount, fill_price,
                commission, broker_order_id, status, pnl, error, idempotency_key, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(trade.ticker.as_str())
        .bind(trade.side.as_str())
        .bind(trade.requested_qty.map(encode_decimal))
        .bind(encode_decimal(trade.filled_qty))
        .bind(trade.requested_amount.map(encode_decimal))
        .bind(trade.fill_price.map(encode_decimal))
        .bind(encode_decimal(trade.commission))
        .bind(trade.broker_order_id.as_ref().map(BrokerOrderId::as_str))
        .bind(trade.status.as_str())
        .bind(trade.pnl.map(encode_decimal))
        .bind(trade.error.as_deref())
        .bind(trade.idempotency_key.as_ref().map(IdempotencyKey::as_str))
        .bind(encode_time(trade.created_at))
        .execute(&mut **tx)
        .await?
        .last_insert_rowid();

        for (position, lot_id) in lot_ids.iter().enumerate() {
            sqlx::query("INSERT INTO trade_lots (trade_id, position, lot_id) VALUES (?, ?, ?)")
                .bind(id)
                .bind(position as i64)
                .bind(lot_id.value())
                .execute(&mut **tx)
                .await?;
        }

        Ok(TradeId::new(id))
    }

    fn lot_from_row(row: &SqliteRow) -> Result<PositionLot, PersistenceError> {
        Ok(PositionLot {
            id: LotId::new(row.try_get("id")?),
            ticker: ticker(row, "ticker")?,
            qty: decimal(row, "qty")?,
            entry_price: decimal(row, "entry_price")?,
            entry_amount: decimal(row, "entry_amount")?,
            entry_time: time(row, "entry_time")?,
            entry_order_id: optional_text(row, "entry_order_id")?.map(BrokerOrderId::new),
            status: parsed::<LotStatus>(row, "status")?,
            exit_price: optional_decimal(row, "exit_price")?,
            exit_amount: optional_decimal(row, "exit_amount")?,
            exit_time: optional_time(row, "exit_time")?,
            pnl: optional_decimal(row, "pnl")?,
            pnl_pct: optional_decimal(row, "pnl_pct")?,
        })
    }

    async fn trade_from_row(&self, row: &SqliteRow) -> Result<TradeRecord, PersistenceError> {
        let id: i64 = row.try_get("id")?;
        let lot_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT lot_id FROM trade_lots WHERE trade_id = ? ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(TradeRecord {
            id: TradeId::new(id),
            ticker: ticker(row, "ticker")?,
            side: parsed(row, "side")?,
            requested_qty: optional_decimal(row, "requested_qty")?,
            filled_qty: decimal(row, "filled_qty")?,
            requested_amount: optional_decimal(row, "requested_amount")?,
            fill_price: optional_decimal(row, "fill_price")?,
            commission: decimal(row, "commission")?,
            broker_order_id: optional_text(row, "broker_order_id")?.map(BrokerOrderId::new),
            status: parsed(row, "status")?,
            lot_ids: lot_ids.into_iter().map(LotId::new).collect(),
            pnl: optional_decimal(row, "pnl")?,
            error: optional_text(row, "error")?,
            idempotency_key: optional_text(row, "idempotency_key")?.map(IdempotencyKey::new),
            created_at: time(row, "created_at")?,
        })
    }

    async fn open_lots_where(
        &self,
        ticker: Option<&Ticker>,
    ) -> Result<Vec<PositionLot>, PersistenceError> {
        let sql = format!(
            "SELECT {LOT_COLUMNS} FROM position_lots \
             WHERE status = 'OPEN' AND (?1 IS NULL OR ticker = ?1) \
             ORDER BY entry_time, id"
        );
        let rows = sqlx::query(&sql)
            .bind(ticker.map(Ticker::as_str))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::lot_from_row).collect()
    }
}

#[async_trait]
impl LedgerPort for SqliteLedger {
    async fn open_lots(&self, ticker: &Ticker) -> Result<Vec<PositionLot>, PersistenceError> {
        self.open_lots_where(Some(ticker)).await
    }

    async fn all_open_lots(&self) -> Result<Vec<PositionLot>, PersistenceError> {
        self.open_lots_where(None).await
    }

    async fn open_lot_count(&self) -> Result<u64, PersistenceError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM position_lots WHERE status = 'OPEN'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.unsigned_abs())
    }

    async fn open_lot_count_for(&self, ticker: &Ticker) -> Result<u64, PersistenceError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM position_lots WHERE status = 'OPEN' AND ticker = ?",
        )
        .bind(ticker.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count.unsigned_abs())
    }

    async fn total_invested(&self) -> Result<Decimal, PersistenceError> {
        let amounts: Vec<String> =
            sqlx::query_scalar("SELECT entry_amount FROM position_lots WHERE status = 'OPEN'")
                .fetch_all(&self.pool)
                .await?;
        amounts
            .iter()
            .map(|raw| super::parse_decimal(raw, "entry_amount"))
            .sum()
    }

    async fn buys_since(&self, since: DateTime<Utc>) -> Result<u64, PersistenceError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM trades
            WHERE side = 'BUY' AND status IN ('FILLED', 'PARTIAL') AND created_at >= ?
            ",
        )
        .bind(encode_time(since))
        .fetch_one(&self.pool)
        .await?;
        Ok(count.unsigned_abs())
    }

    async fn realized_loss_since(&self, since: DateTime<Utc>) -> Result<Decimal, PersistenceError> {
        let pnls: Vec<String> = sqlx::query_scalar(
            r"
            SELECT pnl FROM trades
            WHERE side = 'SELL' AND status IN ('FILLED', 'PARTIAL')
              AND pnl IS NOT NULL AND created_at >= ?
            ",
        )
        .bind(encode_time(since))
        .fetch_all(&self.pool)
        .await?;

        let mut loss = Decimal::ZERO;
        for raw in &pnls {
            let pnl = super::parse_decimal(raw, "pnl")?;
            if pnl < Decimal::ZERO {
                loss -= pnl;
            }
        }
        Ok(loss)
    }

    async fn record_buy_fill(
        &self,
        lot: NewLot,
        trade: NewTrade,
    ) -> Result<(LotId, TradeId), PersistenceError> {
        let mut tx = begin_write(&self.pool).await?;

        let lot_id = sqlx::query(
            r"
            INSERT INTO position_lots (
                ticker, qty, entry_price, entry_amount, entry_time, entry_order_id, status
            ) VALUES (?, ?, ?, ?, ?, ?, 'OPEN')
            ",
        )
        .bind(lot.ticker.as_str())
        .bind(encode_decimal(lot.qty))
        .bind(encode_decimal(lot.entry_price))
        .bind(encode_decimal(lot.entry_amount()))
        .bind(encode_time(lot.entry_time))
        .bind(lot.entry_order_id.as_ref().map(BrokerOrderId::as_str))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        let lot_id = LotId::new(lot_id);

        let trade_id = Self::insert_trade(&mut tx, &trade, &[lot_id]).await?;
        tx.commit().await?;

        debug!(%lot_id, %trade_id, ticker = %lot.ticker, "Buy fill recorded");
        Ok((lot_id, trade_id))
    }

    async fn record_sell_fill(
        &self,
        allocation: &SellAllocation,
        exit_time: DateTime<Utc>,
        trade: NewTrade,
    ) -> Result<TradeId, PersistenceError> {
        let mut tx = begin_write(&self.pool).await?;
        let exit_price = encode_decimal(allocation.exit_price);
        let exit_time = encode_time(exit_time);
        let mut closed_ids = Vec::with_capacity(allocation.closes.len());

        for close in &allocation.closes {
            let sql = format!("SELECT {LOT_COLUMNS} FROM position_lots WHERE id = ?");
            let current = sqlx::query(&sql)
                .bind(close.lot_id.value())
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| Self::lot_from_row(&row))
                .transpose()?;
            let lot = match current {
                Some(lot) if lot.is_open() && lot.qty == close.lot_qty => lot,
                _ => {
                    // Dropping the transaction rolls back earlier closes.
                    return Err(PersistenceError::Integrity(format!(
                        "lot {} is not open with qty {}",
                        close.lot_id, close.lot_qty
                    )));
                }
            };

            if close.is_split() {
                sqlx::query("UPDATE position_lots SET qty = ?, entry_amount = ? WHERE id = ?")
                    .bind(encode_decimal(close.remaining_qty))
                    .bind(encode_decimal(close.remaining_entry_amount))
                    .bind(lot.id.value())
                    .execute(&mut *tx)
                    .await?;

                let closed_id = sqlx::query(
                    r"
                    INSERT INTO position_lots (
                        ticker, qty, entry_price, entry_amount, entry_time, entry_order_id,
                        status, exit_price, exit_amount, exit_time, pnl, pnl_pct
                    ) VALUES (?, ?, ?, ?, ?, ?, 'CLOSED', ?, ?, ?, ?, ?)
                    ",
                )
                .bind(lot.ticker.as_str())
                .bind(encode_decimal(close.close_qty))
                .bind(encode_decimal(lot.entry_price))
                .bind(encode_decimal(close.entry_amount))
                .bind(encode_time(lot.entry_time))
                .bind(lot.entry_order_id.as_ref().map(BrokerOrderId::as_str))
                .bind(&exit_price)
                .bind(encode_decimal(close.exit_amount))
                .bind(&exit_time)
                .bind(encode_decimal(close.pnl))
                .bind(encode_decimal(close.pnl_pct))
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();
                closed_ids.push(LotId::new(closed_id));
            } else {
                sqlx::query(
                    r"
                    UPDATE position_lots
                    SET status = 'CLOSED', qty = ?, entry_amount = ?, exit_price = ?,
                        exit_amount = ?, exit_time = ?, pnl = ?, pnl_pct = ?
                    WHERE id = ?
                    ",
                )
                .bind(encode_decimal(close.close_qty))
                .bind(encode_decimal(close.entry_amount))
                .bind(&exit_price)
                .bind(encode_decimal(close.exit_amount))
                .bind(&exit_time)
                .bind(encode_decimal(close.pnl))
                .bind(encode_decimal(close.pnl_pct))
                .bind(lot.id.value())
                .execute(&mut *tx)
                .await?;
                closed_ids.push(lot.id);
            }
        }

        let trade_id = Self::insert_trade(&mut tx, &trade, &closed_ids).await?;
        tx.commit().await?;

        debug!(%trade_id, lots = closed_ids.len(), "Sell fill recorded");
        Ok(trade_id)
    }

    async fn record_trade(&self, trade: NewTrade) -> Result<TradeId, PersistenceError> {
        let mut tx = begin_write(&self.pool).await?;
        let trade_id = Self::insert_trade(&mut tx, &trade, &trade.lot_ids).await?;
        tx.commit().await?;
        Ok(trade_id)
    }

    async fn recent_trades(&self, limit: u32) -> Result<Vec<TradeRecord>, PersistenceError> {
        let sql = format!("SELECT {TRADE_COLUMNS} FROM trades ORDER BY id DESC LIMIT ?");
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        let mut trades = Vec::with_capacity(rows.len());
        for row in &rows {
            trades.push(self.trade_from_row(row).await?);
        }
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::{TradeStatus, allocate_sell};
    use crate::domain::shared::OrderSide;
    use crate::infrastructure::persistence::{connect_in_memory, connect_pool};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, minute, 0).unwrap()
    }

    fn filled(side: OrderSide, symbol: &str, qty: Decimal, price: Decimal) -> NewTrade {
        NewTrade {
            status: TradeStatus::Filled,
            filled_qty: qty,
            fill_price: Some(price),
            error: None,
            ..NewTrade::failed(Ticker::parse(symbol).unwrap(), side, "", at(0))
        }
    }

    async fn ledger_with_lots(lots: &[(Decimal, Decimal)]) -> SqliteLedger {
        let ledger = SqliteLedger::new(connect_in_memory().await.unwrap());
        for (i, (qty, price)) in lots.iter().enumerate() {
            let lot = NewLot {
                ticker: Ticker::parse("AAPL").unwrap(),
                qty: *qty,
                entry_price: *price,
                entry_time: at(i as u32),
                entry_order_id: Some(BrokerOrderId::new(format!("b-{i}"))),
            };
            ledger
                .record_buy_fill(lot, filled(OrderSide::Buy, "AAPL", *qty, *price))
                .await
                .unwrap();
        }
        ledger
    }

    #[tokio::test]
    async fn buy_fill_creates_lot_and_trade() {
        let ledger = ledger_with_lots(&[(dec!(2.5), dec!(120))]).await;

        let lots = ledger.all_open_lots().await.unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].entry_amount, dec!(300));
        assert_eq!(lots[0].entry_order_id.as_ref().unwrap().as_str(), "b-0");
        assert_eq!(ledger.total_invested().await.unwrap(), dec!(300));
        assert_eq!(ledger.buys_since(at(0)).await.unwrap(), 1);

        let trades = ledger.recent_trades(10).await.unwrap();
        assert_eq!(trades[0].lot_ids, vec![lots[0].id]);
        assert_eq!(trades[0].status, TradeStatus::Filled);
    }

    #[tokio::test]
    async fn full_sell_closes_every_lot() {
        let ledger = ledger_with_lots(&[(dec!(1), dec!(100)), (dec!(2), dec!(90))]).await;
        let open = ledger.open_lots(&Ticker::parse("AAPL").unwrap()).await.unwrap();
        let allocation = allocate_sell(&open, dec!(3), dec!(95));

        let trade = NewTrade {
            pnl: Some(allocation.total_pnl),
            ..filled(OrderSide::Sell, "AAPL", dec!(3), dec!(95))
        };
        ledger.record_sell_fill(&allocation, at(30), trade).await.unwrap();

        assert_eq!(ledger.open_lot_count().await.unwrap(), 0);
        let trades = ledger.recent_trades(1).await.unwrap();
        assert_eq!(trades[0].lot_ids, vec![open[0].id, open[1].id]);
        // 1 * 95 - 100 + 2 * 95 - 180 = 5
        assert_eq!(trades[0].pnl, Some(dec!(5)));
        assert_eq!(ledger.realized_loss_since(at(0)).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn partial_sell_splits_boundary_lot() {
        let ledger = ledger_with_lots(&[(dec!(10), dec!(10)), (dec!(5), dec!(12))]).await;
        let ticker = Ticker::parse("AAPL").unwrap();
        let open = ledger.open_lots(&ticker).await.unwrap();
        let allocation = allocate_sell(&open, dec!(12), dec!(11));

        let trade = NewTrade {
            status: TradeStatus::Partial,
            pnl: Some(allocation.total_pnl),
            ..filled(OrderSide::Sell, "AAPL", dec!(12), dec!(11))
        };
        ledger.record_sell_fill(&allocation, at(30), trade).await.unwrap();

        let remaining = ledger.open_lots(&ticker).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, open[1].id);
        assert_eq!(remaining[0].qty, dec!(3));
        assert_eq!(remaining[0].entry_amount, dec!(36));

        let trade = &ledger.recent_trades(1).await.unwrap()[0];
        assert_eq!(trade.lot_ids.len(), 2);
        assert_eq!(trade.lot_ids[0], open[0].id);
        assert_ne!(trade.lot_ids[1], open[1].id);
    }

    #[tokio::test]
    async fn losses_are_summed_as_positive() {
        let ledger = ledger_with_lots(&[(dec!(1), dec!(100)), (dec!(1), dec!(100))]).await;
        let ticker = Ticker::parse("AAPL").unwrap();

        for exit in [dec!(90), dec!(70)] {
            let open = ledger.open_lots(&ticker).await.unwrap();
            let allocation = allocate_sell(&open[..1], dec!(1), exit);
            let trade = NewTrade {
                pnl: Some(allocation.total_pnl),
                ..filled(OrderSide::Sell, "AAPL", dec!(1), exit)
            };
            ledger.record_sell_fill(&allocation, at(40), trade).await.unwrap();
        }

        assert_eq!(ledger.realized_loss_since(at(0)).await.unwrap(), dec!(40));
        assert_eq!(
            ledger.realized_loss_since(at(1)).await.unwrap(),
            Decimal::ZERO,
            "trades stamped before the cutoff are ignored"
        );
    }

    #[tokio::test]
    async fn stale_allocation_rolls_back() {
        let ledger = ledger_with_lots(&[(dec!(1), dec!(100)), (dec!(1), dec!(100))]).await;
        let ticker = Ticker::parse("AAPL").unwrap();
        let open = ledger.open_lots(&ticker).await.unwrap();
        let mut allocation = allocate_sell(&open, dec!(2), dec!(101));
        allocation.closes[1].lot_qty = dec!(7);

        let err = ledger
            .record_sell_fill(&allocation, at(30), filled(OrderSide::Sell, "AAPL", dec!(2), dec!(101)))
            .await
            .unwrap_err();

        assert!(matches!(err, PersistenceError::Integrity(_)));
        assert_eq!(ledger.open_lot_count_for(&ticker).await.unwrap(), 2);
        assert_eq!(ledger.recent_trades(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_trades_do_not_count_as_buys() {
        let ledger = SqliteLedger::new(connect_in_memory().await.unwrap());
        let failed = NewTrade {
            broker_order_id: Some(BrokerOrderId::new("b-9")),
            idempotency_key: Some(IdempotencyKey::new("k-9")),
            ..NewTrade::failed(Ticker::parse("MSFT").unwrap(), OrderSide::Buy, "rejected", at(5))
        };
        ledger.record_trade(failed).await.unwrap();

        assert_eq!(ledger.buys_since(at(0)).await.unwrap(), 0);
        let trade = &ledger.recent_trades(1).await.unwrap()[0];
        assert_eq!(trade.error.as_deref(), Some("rejected"));
        assert_eq!(trade.idempotency_key.as_ref().unwrap().as_str(), "k-9");
    }

    #[tokio::test]
    async fn sell_fill_waits_for_concurrent_intake_write() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
        let pool = connect_pool(&url, 4).await.unwrap();
        let ledger = SqliteLedger::new(pool.clone());
        let ticker = Ticker::parse("AAPL").unwrap();
        let lot = NewLot {
            ticker: ticker.clone(),
            qty: dec!(2),
            entry_price: dec!(100),
            entry_time: at(0),
            entry_order_id: None,
        };
        ledger
            .record_buy_fill(lot, filled(OrderSide::Buy, "AAPL", dec!(2), dec!(100)))
            .await
            .unwrap();
        let open = ledger.open_lots(&ticker).await.unwrap();
        let allocation = allocate_sell(&open, dec!(2), dec!(110));

        // An intake write holds the lock while the fill arrives.
        let mut intake = pool.begin_with("BEGIN IMMEDIATE").await.unwrap();
        sqlx::query(
            "INSERT INTO signal_audit (idempotency_key, action, ticker, raw_payload, received_at) \
             VALUES ('k-1', 'BUY', 'MSFT', '{}', '2026-03-02T15:00:00.000000Z')",
        )
        .execute(&mut *intake)
        .await
        .unwrap();

        let sell = tokio::spawn({
            let ledger = ledger.clone();
            let trade = NewTrade {
                pnl: Some(allocation.total_pnl),
                ..filled(OrderSide::Sell, "AAPL", dec!(2), dec!(110))
            };
            async move { ledger.record_sell_fill(&allocation, at(30), trade).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        intake.commit().await.unwrap();

        sell.await.unwrap().unwrap();
        assert_eq!(ledger.open_lot_count().await.unwrap(), 0);
        assert_eq!(ledger.recent_trades(1).await.unwrap()[0].pnl, Some(dec!(20)));
        let audited: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM signal_audit")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(audited, 1);
    }
}
