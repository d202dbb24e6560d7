//! SQLite order queue and intake audit.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::{begin_write, encode_decimal, encode_time, optional_text, parsed, ticker, time};
use crate::application::ports::{IntakeInsert, IntakeStorePort, OrderQueuePort, PersistenceError};
use crate::domain::order_queue::{Lane, QueueStats, QueuedOrder};
use crate::domain::shared::IdempotencyKey;
use crate::domain::signal::Signal;

const INSERT_ORDER: &str = r"
    INSERT INTO queued_orders (seq, lane, action, ticker, idempotency_key, enqueued_at, pending_reason)
    VALUES (?, ?, ?, ?, ?, ?, ?)
";

fn order_from_row(row: &SqliteRow) -> Result<QueuedOrder, PersistenceError> {
    Ok(QueuedOrder {
        seq: Some(row.try_get("seq")?),
        action: parsed(row, "action")?,
        ticker: ticker(row, "ticker")?,
        idempotency_key: IdempotencyKey::new(super::text(row, "idempotency_key")?),
        enqueued_at: time(row, "enqueued_at")?,
        pending_reason: optional_text(row, "pending_reason")?,
    })
}

async fn insert_order<'e, E>(
    executor: E,
    lane: Lane,
    order: &QueuedOrder,
    reason: Option<&str>,
) -> Result<i64, PersistenceError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(INSERT_ORDER)
        .bind(order.seq)
        .bind(lane.as_str())
        .bind(order.action.as_str())
        .bind(order.ticker.as_str())
        .bind(order.idempotency_key.as_str())
        .bind(encode_time(order.enqueued_at))
        .bind(reason)
        .execute(executor)
        .await?;
    Ok(result.last_insert_rowid())
}

/// [`OrderQueuePort`] backed by the `queued_orders` table.
///
/// The lane is a column; a seq assigned at intake stays with the order
/// when it is parked, flushed or requeued, so arrival order survives.
#[derive(Debug, Clone)]
pub struct SqliteOrderQueue {
    pool: SqlitePool,
}

impl SqliteOrderQueue {
    /// Create a queue on `pool`.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderQueuePort for SqliteOrderQueue {
    async fn enqueue(&self, order: &QueuedOrder) -> Result<i64, PersistenceError> {
        let fresh = QueuedOrder {
            seq: None,
            ..order.clone()
        };
        insert_order(&self.pool, order.active_lane(), &fresh, None).await
    }

    async fn dequeue(&self) -> Result<Option<QueuedOrder>, PersistenceError> {
        let row = sqlx::query(
            r"
            DELETE FROM queued_orders
            WHERE seq = (
                SELECT seq FROM queued_orders
                WHERE lane IN ('sell', 'buy')
                ORDER BY CASE lane WHEN 'sell' THEN 0 ELSE 1 END, seq
                LIMIT 1
            )
            RETURNING seq, action, ticker, idempotency_key, enqueued_at, pending_reason
            ",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn park_pending(
        &self,
        order: &QueuedOrder,
        reason: &str,
    ) -> Result<(), PersistenceError> {
        insert_order(&self.pool, Lane::Pending, order, Some(reason)).await?;
        Ok(())
    }

    async fn requeue(&self, order: &QueuedOrder) -> Result<(), PersistenceError> {
        insert_order(&self.pool, order.active_lane(), order, None).await?;
        Ok(())
    }

    async fn flush_pending(&self) -> Result<u64, PersistenceError> {
        let moved = sqlx::query(
            r"
            UPDATE queued_orders
            SET lane = CASE action WHEN 'SELL' THEN 'sell' ELSE 'buy' END,
                pending_reason = NULL
            WHERE lane = 'pending'
            ",
        )
        .execute(&self.pool)
        .await?
        .rows_affected();
        debug!(moved, "Pending lane flushed");
        Ok(moved)
    }

    async fn stats(&self) -> Result<QueueStats, PersistenceError> {
        let rows = sqlx::query("SELECT lane, COUNT(*) AS n FROM queued_orders GROUP BY lane")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = QueueStats::default();
        for row in &rows {
            let n = row.try_get::<i64, _>("n")?.unsigned_abs();
            match row.try_get::<String, _>("lane")?.as_str() {
                "sell" => stats.sell = n,
                "buy" => stats.buy = n,
                _ => stats.pending = n,
            }
        }
        Ok(stats)
    }

    async fn clear_all(&self) -> Result<u64, PersistenceError> {
        Ok(sqlx::query("DELETE FROM queued_orders")
            .execute(&self.pool)
            .await?
            .rows_affected())
    }
}

/// [`IntakeStorePort`] writing `signal_audit` and `queued_orders` in one
/// transaction.
#[derive(Debug, Clone)]
pub struct SqliteIntakeStore {
    pool: SqlitePool,
}

impl SqliteIntakeStore {
    /// Create an intake store on `pool`.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IntakeStorePort for SqliteIntakeStore {
    async fn record_and_enqueue(
        &self,
        signal: &Signal,
        order: &QueuedOrder,
    ) -> Result<IntakeInsert, PersistenceError> {
        let mut tx = begin_write(&self.pool).await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO signal_audit (
                idempotency_key, action, ticker, price, source, raw_payload, received_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (idempotency_key) DO NOTHING
            ",
        )
        .bind(signal.idempotency_key.as_str())
        .bind(signal.action.as_str())
        .bind(signal.ticker.as_str())
        .bind(signal.price.map(encode_decimal))
        .bind(signal.source.as_deref())
        .bind(&signal.raw_payload)
        .bind(encode_time(signal.received_at))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(IntakeInsert::Duplicate);
        }

        let fresh = QueuedOrder {
            seq: None,
            ..order.clone()
        };
        let seq = insert_order(&mut *tx, order.active_lane(), &fresh, None).await?;
        tx.commit().await?;
        Ok(IntakeInsert::Inserted { seq })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::{OrderSide, Ticker};
    use crate::infrastructure::persistence::{connect_in_memory, connect_pool};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 13, minute, 0).unwrap()
    }

    fn order(side: OrderSide, key: &str) -> QueuedOrder {
        QueuedOrder {
            seq: None,
            action: side,
            ticker: Ticker::parse("AAPL").unwrap(),
            idempotency_key: IdempotencyKey::new(key),
            enqueued_at: at(0),
            pending_reason: None,
        }
    }

    fn signal(key: &str) -> Signal {
        Signal {
            action: OrderSide::Buy,
            ticker: Ticker::parse("AAPL").unwrap(),
            price: None,
            idempotency_key: IdempotencyKey::new(key),
            received_at: at(0),
            source: Some("tv".to_string()),
            raw_payload: r#"{"action":"BUY","ticker":"AAPL"}"#.to_string(),
        }
    }

    async fn queue() -> SqliteOrderQueue {
        SqliteOrderQueue::new(connect_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn sells_dequeue_before_older_buys() {
        let queue = queue().await;
        queue.enqueue(&order(OrderSide::Buy, "b1")).await.unwrap();
        queue.enqueue(&order(OrderSide::Buy, "b2")).await.unwrap();
        queue.enqueue(&order(OrderSide::Sell, "s1")).await.unwrap();

        let keys: Vec<String> = [
            queue.dequeue().await.unwrap(),
            queue.dequeue().await.unwrap(),
            queue.dequeue().await.unwrap(),
        ]
        .into_iter()
        .map(|o| o.unwrap().idempotency_key.into_inner())
        .collect();

        assert_eq!(keys, ["s1", "b1", "b2"]);
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_orders_wait_for_flush() {
        let queue = queue().await;
        queue
            .park_pending(&order(OrderSide::Sell, "s1"), "Market closed")
            .await
            .unwrap();
        queue.enqueue(&order(OrderSide::Buy, "b1")).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!((stats.sell, stats.buy, stats.pending), (0, 1, 1));
        assert_eq!(
            queue.dequeue().await.unwrap().unwrap().idempotency_key.as_str(),
            "b1"
        );
        assert!(queue.dequeue().await.unwrap().is_none());

        assert_eq!(queue.flush_pending().await.unwrap(), 1);
        let released = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(released.idempotency_key.as_str(), "s1");
        assert_eq!(released.pending_reason, None);
    }

    #[tokio::test]
    async fn requeue_restores_original_position() {
        let queue = queue().await;
        queue.enqueue(&order(OrderSide::Buy, "b1")).await.unwrap();
        queue.enqueue(&order(OrderSide::Buy, "b2")).await.unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        queue.requeue(&first).await.unwrap();

        let again = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(again.idempotency_key.as_str(), "b1");
        assert_eq!(again.seq, first.seq);
    }

    #[tokio::test]
    async fn clear_all_counts_every_lane() {
        let queue = queue().await;
        queue.enqueue(&order(OrderSide::Buy, "b1")).await.unwrap();
        queue.enqueue(&order(OrderSide::Sell, "s1")).await.unwrap();
        queue
            .park_pending(&order(OrderSide::Buy, "p1"), "Market closed")
            .await
            .unwrap();

        assert_eq!(queue.clear_all().await.unwrap(), 3);
        assert_eq!(queue.stats().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn intake_is_idempotent_and_atomic() {
        let pool = connect_in_memory().await.unwrap();
        let store = SqliteIntakeStore::new(pool.clone());
        let queue = SqliteOrderQueue::new(pool.clone());
        let sig = signal("alert-1");
        let queued = QueuedOrder::from_signal(&sig);

        let first = store.record_and_enqueue(&sig, &queued).await.unwrap();
        let second = store.record_and_enqueue(&sig, &queued).await.unwrap();

        assert!(matches!(first, IntakeInsert::Inserted { .. }));
        assert_eq!(second, IntakeInsert::Duplicate);
        assert_eq!(queue.stats().await.unwrap().buy, 1);

        let (source, payload): (Option<String>, String) =
            sqlx::query_as("SELECT source, raw_payload FROM signal_audit WHERE idempotency_key = ?")
                .bind("alert-1")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(source.as_deref(), Some("tv"));
        assert!(payload.contains("AAPL"));
    }

    #[tokio::test]
    async fn duplicate_stays_rejected_after_dequeue() {
        let pool = connect_in_memory().await.unwrap();
        let store = SqliteIntakeStore::new(pool.clone());
        let queue = SqliteOrderQueue::new(pool);
        let sig = signal("alert-2");

        store
            .record_and_enqueue(&sig, &QueuedOrder::from_signal(&sig))
            .await
            .unwrap();
        queue.dequeue().await.unwrap().unwrap();

        let replay = store
            .record_and_enqueue(&sig, &QueuedOrder::from_signal(&sig))
            .await
            .unwrap();
        assert_eq!(replay, IntakeInsert::Duplicate);
        assert_eq!(queue.stats().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn intake_waits_for_open_ledger_write() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("queue.db").display());
        let pool = connect_pool(&url, 4).await.unwrap();
        let store = std::sync::Arc::new(SqliteIntakeStore::new(pool.clone()));
        let queue = SqliteOrderQueue::new(pool.clone());

        // A sell fill has read its lots and not yet written.
        let mut fill = pool.begin_with("BEGIN IMMEDIATE").await.unwrap();
        let _: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM position_lots")
            .fetch_one(&mut *fill)
            .await
            .unwrap();

        let intake = tokio::spawn({
            let store = std::sync::Arc::clone(&store);
            async move {
                let sig = signal("alert-3");
                store
                    .record_and_enqueue(&sig, &QueuedOrder::from_signal(&sig))
                    .await
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        sqlx::query("UPDATE risk_settings SET paused = paused")
            .execute(&mut *fill)
            .await
            .unwrap();
        fill.commit().await.unwrap();

        let inserted = intake.await.unwrap().unwrap();
        assert!(matches!(inserted, IntakeInsert::Inserted { .. }));
        assert_eq!(queue.stats().await.unwrap().buy, 1);
    }
}
