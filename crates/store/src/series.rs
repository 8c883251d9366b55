//! Append-only series: balances, token quotes, gas readings and contract
//! transactions.

use crate::db::{iso_timestamp, ServerStore, StoreError};
use crate::diffs::lookup_quote;
use fleet_core::{BalanceSnapshot, ContractTx, GasReading, TokenQuote};
use serde::Serialize;
use tracing::debug;

/// Buy/sell pair of a stored token quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StoredQuote {
    pub buy: Option<f64>,
    pub sell: Option<f64>,
}

/// Contract transaction outcome counts over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ContractTxStats {
    pub total: i64,
    pub failed: i64,
}

impl ContractTxStats {
    pub fn succeeded(&self) -> i64 {
        self.total - self.failed
    }

    /// Success percentage; an empty window counts as fully successful.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.succeeded() as f64 / self.total as f64 * 100.0
        }
    }
}

impl ServerStore {
    pub async fn insert_balance_snapshot(
        &self,
        snapshot: &BalanceSnapshot,
        at_millis: i64,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO balances_history (timestamp, total_usdt, total_coin, raw_data) VALUES (?, ?, ?, ?)",
        )
        .bind(iso_timestamp(at_millis))
        .bind(snapshot.total_usdt)
        .bind(snapshot.total_coin)
        .bind(&snapshot.raw_data)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Raw JSON of the most recent balance snapshot.
    pub async fn latest_balance_raw(&self) -> Result<Option<String>, StoreError> {
        let raw = sqlx::query_scalar::<_, Option<String>>(
            "SELECT raw_data FROM balances_history ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(raw.flatten())
    }

    /// Store quotes parsed from one status page under a shared timestamp.
    pub async fn insert_token_quotes(
        &self,
        quotes: &[TokenQuote],
        at_millis: i64,
    ) -> Result<usize, StoreError> {
        let timestamp = iso_timestamp(at_millis);
        let mut tx = self.pool.begin().await?;
        for quote in quotes {
            sqlx::query("INSERT INTO server_tokens (timestamp, name, buy, sell) VALUES (?, ?, ?, ?)")
                .bind(&timestamp)
                .bind(&quote.name)
                .bind(quote.buy)
                .bind(quote.sell)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(quotes.len())
    }

    pub async fn latest_token_quote(&self, name: &str) -> Result<Option<StoredQuote>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        lookup_quote(&mut *conn, name).await
    }

    pub async fn insert_gas_readings(
        &self,
        readings: &[GasReading],
        at_millis: i64,
    ) -> Result<usize, StoreError> {
        let timestamp = iso_timestamp(at_millis);
        let mut tx = self.pool.begin().await?;
        for reading in readings {
            sqlx::query("INSERT INTO gas_balances (timestamp, contract, gas, is_low) VALUES (?, ?, ?, ?)")
                .bind(&timestamp)
                .bind(&reading.contract)
                .bind(reading.gas)
                .bind(reading.is_low)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(readings.len())
    }

    pub async fn low_gas_count_since(&self, since_millis: i64) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM gas_balances WHERE timestamp >= ? AND is_low = 1",
        )
        .bind(iso_timestamp(since_millis))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Insert explorer transactions not seen before. Returns how many were new.
    pub async fn insert_contract_transactions(
        &self,
        server_id: &str,
        txs: &[ContractTx],
    ) -> Result<u64, StoreError> {
        let mut db_tx = self.pool.begin().await?;
        let mut inserted = 0;
        for t in txs {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO contract_transactions
                    (hash, serverId, timestamp, isError, reason, ethPrice, polPrice, bnbPrice, raw_data)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&t.hash)
            .bind(server_id)
            .bind(t.timestamp)
            .bind(t.is_error)
            .bind(&t.reason)
            .bind(t.prices.eth)
            .bind(t.prices.pol)
            .bind(t.prices.bnb)
            .bind(&t.raw_data)
            .execute(&mut *db_tx)
            .await?;
            inserted += result.rows_affected();
        }
        db_tx.commit().await?;
        debug!(server = server_id, inserted, total = txs.len(), "Stored contract transactions");
        Ok(inserted)
    }

    pub async fn contract_tx_stats_since(&self, since_millis: i64) -> Result<ContractTxStats, StoreError> {
        let (total, failed) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COALESCE(SUM(CASE WHEN isError = 1 THEN 1 ELSE 0 END), 0)
            FROM contract_transactions
            WHERE timestamp >= ?
            "#,
        )
        .bind(since_millis)
        .fetch_one(&self.pool)
        .await?;
        Ok(ContractTxStats { total, failed })
    }
}
