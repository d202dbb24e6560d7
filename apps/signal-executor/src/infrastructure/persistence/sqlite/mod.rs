//! SQLite storage adapters.
//!
//! All four adapters share one pool. Decimals are stored as TEXT so values
//! survive exactly; timestamps are RFC 3339 UTC with a fixed microsecond
//! precision, which keeps string comparison in time order.

mod ledger;
mod queue;
mod settings;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::application::ports::PersistenceError;
use crate::domain::shared::Ticker;

pub use ledger::SqliteLedger;
pub use queue::{SqliteIntakeStore, SqliteOrderQueue};
pub use settings::SqliteSettings;

/// How long a connection waits for another writer before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound(err.to_string()),
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => Self::Connection(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Serialization(err.to_string())
            }
            _ => Self::Query(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for PersistenceError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Connection(format!("migration failed: {err}"))
    }
}

/// Open a pool on `database_url` and apply migrations.
///
/// The database file is created if missing and runs in WAL mode, so
/// readers never block the writer.
///
/// # Errors
///
/// Fails when the URL is invalid, the database cannot be opened, or a
/// migration fails.
pub async fn connect_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<SqlitePool, PersistenceError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| PersistenceError::Connection(e.to_string()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!(database_url, max_connections, "SQLite pool ready");
    Ok(pool)
}

/// A private in-memory database on a single long-lived connection.
///
/// # Errors
///
/// Fails when the database cannot be opened or a migration fails.
pub async fn connect_in_memory() -> Result<SqlitePool, PersistenceError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| PersistenceError::Connection(e.to_string()))?
        .foreign_keys(true);

    // Every connection to :memory: is a separate database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Start a transaction that takes the write lock at `BEGIN`.
///
/// Later writes in the transaction never upgrade a read lock, so a busy
/// database makes it wait for [`BUSY_TIMEOUT`] rather than fail at once.
async fn begin_write(
    pool: &SqlitePool,
) -> Result<Transaction<'static, Sqlite>, PersistenceError> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

// ============================================================================
// Column codecs
// ============================================================================

fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn encode_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

fn text(row: &SqliteRow, column: &str) -> Result<String, PersistenceError> {
    row.try_get::<String, _>(column)
        .map_err(|e| PersistenceError::Serialization(format!("{column}: {e}")))
}

fn optional_text(row: &SqliteRow, column: &str) -> Result<Option<String>, PersistenceError> {
    row.try_get::<Option<String>, _>(column)
        .map_err(|e| PersistenceError::Serialization(format!("{column}: {e}")))
}

fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal, PersistenceError> {
    parse_decimal(&text(row, column)?, column)
}

fn optional_decimal(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, PersistenceError> {
    optional_text(row, column)?
        .map(|raw| parse_decimal(&raw, column))
        .transpose()
}

fn parse_decimal(raw: &str, column: &str) -> Result<Decimal, PersistenceError> {
    Decimal::from_str(raw)
        .map_err(|e| PersistenceError::Serialization(format!("{column} '{raw}': {e}")))
}

fn time(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, PersistenceError> {
    parse_time(&text(row, column)?, column)
}

fn optional_time(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<DateTime<Utc>>, PersistenceError> {
    optional_text(row, column)?
        .map(|raw| parse_time(&raw, column))
        .transpose()
}

fn parse_time(raw: &str, column: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Serialization(format!("{column} '{raw}': {e}")))
}

fn ticker(row: &SqliteRow, column: &str) -> Result<Ticker, PersistenceError> {
    let raw = text(row, column)?;
    Ticker::parse(&raw).map_err(|e| PersistenceError::Integrity(format!("{column}: {e}")))
}

fn parsed<T>(row: &SqliteRow, column: &str) -> Result<T, PersistenceError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = text(row, column)?;
    raw.parse()
        .map_err(|e: T::Err| PersistenceError::Integrity(format!("{column}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn encoded_times_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::microseconds(1500);
        assert!(encode_time(early) < encode_time(late));
        assert_eq!(parse_time(&encode_time(late), "t").unwrap(), late);
    }

    #[test]
    fn decimals_keep_exact_value() {
        let value = dec!(0.66230000);
        assert_eq!(encode_decimal(value), "0.6623");
        assert_eq!(parse_decimal("0.6623", "qty").unwrap(), dec!(0.6623));
        assert!(parse_decimal("abc", "qty").is_err());
    }

    #[tokio::test]
    async fn in_memory_pool_is_migrated() {
        let pool = connect_in_memory().await.unwrap();
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('signal_audit', 'queued_orders', 'position_lots', 'trades', 'trade_lots', 'risk_settings')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 6);
    }

    #[tokio::test]
    async fn file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("exec.db").display());
        let pool = connect_pool(&url, 2).await.unwrap();
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        pool.close().await;
        assert!(dir.path().join("exec.db").exists());
        assert_eq!(mode, "wal");
    }
}
