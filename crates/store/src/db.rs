//! Connection handling and schema for one server's store.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Render epoch milliseconds the way text timestamp columns store them.
///
/// The fixed-width UTC form keeps lexical and chronological order equal, so
/// range queries can compare the strings directly.
pub fn iso_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Handle to one server's SQLite database.
#[derive(Clone)]
pub struct ServerStore {
    pub(crate) pool: SqlitePool,
}

/// Columns added after the first schema version, checked on every open.
const DIFF_HISTORY_COLUMNS: &[(&str, &str)] = &[
    ("cexVol", "REAL"),
    ("serverBuy", "REAL"),
    ("serverSell", "REAL"),
    ("dexVolume", "REAL"),
    ("rejectReason", "TEXT"),
];

const NOTIFICATIONS_LOG_COLUMNS: &[(&str, &str)] = &[("read", "INTEGER DEFAULT 0")];

impl ServerStore {
    /// Open (creating if missing) the database file at `path`.
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(path = %path.display(), "Opened server store");
        Ok(store)
    }

    /// Private in-memory database, kept alive by a single pinned connection.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create tables and apply additive column migrations.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS balances_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                total_usdt REAL,
                total_coin REAL,
                raw_data TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS completed_trades (
                id INTEGER PRIMARY KEY,
                fsmType TEXT,
                pair TEXT,
                srcExchange TEXT,
                dstExchange TEXT,
                status TEXT,
                user TEXT,
                estimatedProfitNormalized REAL,
                estimatedProfit REAL,
                estimatedGrossProfit REAL,
                eta TEXT,
                estimatedSrcPrice REAL,
                estimatedDstPrice REAL,
                estimatedQty REAL,
                executedProfitNormalized REAL,
                executedProfit REAL,
                executedGrossProfit REAL,
                executedTime INTEGER,
                executedSrcPrice REAL,
                executedDstPrice REAL,
                executedQtySrc REAL,
                executedQtyDst REAL,
                executedFeeTotal REAL,
                executedFeePercent REAL,
                props TEXT,
                creationTime INTEGER,
                openTime INTEGER,
                lastUpdateTime INTEGER,
                nwId TEXT,
                txFee REAL,
                calculatedVolume REAL,
                conveyedVolume REAL,
                commissionPercent REAL,
                hedge INTEGER,
                raw_data TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_trades_last_update
            ON completed_trades(lastUpdateTime)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS server_tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                name TEXT NOT NULL,
                buy REAL,
                sell REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_server_tokens_name
            ON server_tokens(name, timestamp)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gas_balances (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                contract TEXT NOT NULL,
                gas REAL,
                is_low INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS diff_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                curId TEXT NOT NULL,
                ts INTEGER NOT NULL,
                buyDiffBps INTEGER,
                sellDiffBps INTEGER,
                UNIQUE(curId, ts)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contract_transactions (
                hash TEXT NOT NULL,
                serverId TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                isError INTEGER NOT NULL,
                reason TEXT,
                ethPrice REAL,
                polPrice REAL,
                bnbPrice REAL,
                raw_data TEXT,
                PRIMARY KEY (serverId, hash)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                server_id TEXT,
                rule TEXT,
                title TEXT,
                channel TEXT,
                status TEXT,
                message TEXT,
                details TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notification_state (
                key TEXT PRIMARY KEY,
                last_sent INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        self.ensure_columns("diff_history", DIFF_HISTORY_COLUMNS).await?;
        self.ensure_columns("notifications_log", NOTIFICATIONS_LOG_COLUMNS)
            .await?;

        Ok(())
    }

    /// Append any of `columns` missing from `table`. Never drops or alters.
    async fn ensure_columns(
        &self,
        table: &str,
        columns: &[(&str, &str)],
    ) -> Result<(), StoreError> {
        let existing = sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        for (name, ddl) in columns {
            if existing.iter().any(|c| c == name) {
                continue;
            }
            let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, name, ddl);
            // A failed migration leaves the column missing; writes touching it will error.
            if let Err(e) = sqlx::query(&sql).execute(&self.pool).await {
                warn!(table, column = name, error = %e, "Column migration failed");
            }
        }
        Ok(())
    }

    /// Names of the columns of `table`, in schema order.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let columns = sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_add_late_columns() {
        let store = ServerStore::in_memory().await.unwrap();
        let diff_columns = store.table_columns("diff_history").await.unwrap();
        for (name, _) in DIFF_HISTORY_COLUMNS {
            assert!(diff_columns.iter().any(|c| c == name), "missing {}", name);
        }
        let log_columns = store.table_columns("notifications_log").await.unwrap();
        assert!(log_columns.iter().any(|c| c == "read"));
    }

    #[tokio::test]
    async fn test_migrations_are_repeatable() {
        let store = ServerStore::in_memory().await.unwrap();
        store.run_migrations().await.unwrap();
        let diff_columns = store.table_columns("diff_history").await.unwrap();
        assert_eq!(
            diff_columns.iter().filter(|c| c.as_str() == "cexVol").count(),
            1
        );
    }

    #[test]
    fn test_iso_timestamp_is_fixed_width() {
        assert_eq!(iso_timestamp(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(iso_timestamp(1_700_000_000_123), "2023-11-14T22:13:20.123Z");
    }

    #[tokio::test]
    async fn test_connect_file_store() {
        let dir = std::env::temp_dir().join(format!("fleet-store-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("data-test.sqlite");
        let store = ServerStore::connect(&path).await.unwrap();
        assert!(!store.table_columns("completed_trades").await.unwrap().is_empty());
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
