//! SQLite risk settings row.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::{decimal, encode_decimal, encode_time};
use crate::application::ports::{PersistenceError, SettingsPort};
use crate::domain::risk_management::RiskSettings;

const UPSERT: &str = r"
    INSERT INTO risk_settings (
        id, buy_amount, max_open_positions, max_daily_buys, max_total_investment,
        max_per_ticker, max_daily_loss, min_cash_reserve, paused, killed,
        regular_hours_only, queue_outside_hours, updated_at
    ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
";

/// [`SettingsPort`] over the single-row `risk_settings` table.
#[derive(Debug, Clone)]
pub struct SqliteSettings {
    pool: SqlitePool,
}

impl SqliteSettings {
    /// Create a settings store on `pool`.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write `defaults` unless a row already exists. Returns whether it
    /// was written.
    ///
    /// # Errors
    ///
    /// Fails when the write fails.
    pub async fn seed(&self, defaults: &RiskSettings) -> Result<bool, PersistenceError> {
        let sql = format!("{UPSERT} ON CONFLICT (id) DO NOTHING");
        let written = bind_settings(sqlx::query(&sql), defaults)
            .execute(&self.pool)
            .await?
            .rows_affected()
            > 0;
        if written {
            info!("Risk settings seeded from configuration");
        }
        Ok(written)
    }

    async fn set_flag(&self, column: &str, value: bool) -> Result<(), PersistenceError> {
        let sql = format!("UPDATE risk_settings SET {column} = ?, updated_at = ? WHERE id = 1");
        let updated = sqlx::query(&sql)
            .bind(value)
            .bind(encode_time(Utc::now()))
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(PersistenceError::NotFound("risk settings".to_string()));
        }
        Ok(())
    }
}

fn bind_settings<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    s: &RiskSettings,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(encode_decimal(s.buy_amount))
        .bind(i64::from(s.max_open_positions))
        .bind(i64::from(s.max_daily_buys))
        .bind(encode_decimal(s.max_total_investment))
        .bind(i64::from(s.max_per_ticker))
        .bind(encode_decimal(s.max_daily_loss))
        .bind(encode_decimal(s.min_cash_reserve))
        .bind(s.paused)
        .bind(s.killed)
        .bind(s.regular_hours_only)
        .bind(s.queue_outside_hours)
        .bind(encode_time(Utc::now()))
}

fn count(row: &SqliteRow, column: &str) -> Result<u32, PersistenceError> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw).map_err(|_| PersistenceError::Integrity(format!("{column} = {raw}")))
}

fn settings_from_row(row: &SqliteRow) -> Result<RiskSettings, PersistenceError> {
    Ok(RiskSettings {
        buy_amount: decimal(row, "buy_amount")?,
        max_open_positions: count(row, "max_open_positions")?,
        max_daily_buys: count(row, "max_daily_buys")?,
        max_total_investment: decimal(row, "max_total_investment")?,
        max_per_ticker: count(row, "max_per_ticker")?,
        max_daily_loss: decimal(row, "max_daily_loss")?,
        min_cash_reserve: decimal(row, "min_cash_reserve")?,
        paused: row.try_get("paused")?,
        killed: row.try_get("killed")?,
        regular_hours_only: row.try_get("regular_hours_only")?,
        queue_outside_hours: row.try_get("queue_outside_hours")?,
    })
}

#[async_trait]
impl SettingsPort for SqliteSettings {
    async fn load(&self) -> Result<RiskSettings, PersistenceError> {
        let row = sqlx::query("SELECT * FROM risk_settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PersistenceError::NotFound("risk settings".to_string()))?;
        settings_from_row(&row)
    }

    async fn save(&self, settings: &RiskSettings) -> Result<(), PersistenceError> {
        let sql = format!(
            "{UPSERT} ON CONFLICT (id) DO UPDATE SET \
             buy_amount = excluded.buy_amount, \
             max_open_positions = excluded.max_open_positions, \
             max_daily_buys = excluded.max_daily_buys, \
             max_total_investment = excluded.max_total_investment, \
             max_per_ticker = excluded.max_per_ticker, \
             max_daily_loss = excluded.max_daily_loss, \
             min_cash_reserve = excluded.min_cash_reserve, \
             paused = excluded.paused, \
             killed = excluded.killed, \
             regular_hours_only = excluded.regular_hours_only, \
             queue_outside_hours = excluded.queue_outside_hours, \
             updated_at = excluded.updated_at"
        );
        bind_settings(sqlx::query(&sql), settings)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_paused(&self, paused: bool) -> Result<(), PersistenceError> {
        self.set_flag("paused", paused).await
    }

    async fn set_killed(&self, killed: bool) -> Result<(), PersistenceError> {
        self.set_flag("killed", killed).await
    }
}
