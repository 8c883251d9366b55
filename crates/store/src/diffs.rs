//! Merge/upsert path for diff snapshots.
//!
//! A snapshot is keyed by `(curId, ts)`. Re-ingesting a key merges field by
//! field: measurements take the newest non-null value, while the enriched
//! server quote keeps the first non-null value ever stored.

use crate::db::{ServerStore, StoreError};
use crate::series::StoredQuote;
use fleet_core::DiffSnapshot;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use tracing::debug;

const UPSERT_DIFF: &str = r#"
    INSERT INTO diff_history
        (curId, ts, buyDiffBps, sellDiffBps, cexVol, serverBuy, serverSell, dexVolume, rejectReason)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(curId, ts) DO UPDATE SET
        buyDiffBps = COALESCE(excluded.buyDiffBps, diff_history.buyDiffBps),
        sellDiffBps = COALESCE(excluded.sellDiffBps, diff_history.sellDiffBps),
        cexVol = COALESCE(excluded.cexVol, diff_history.cexVol),
        serverBuy = CASE WHEN diff_history.serverBuy IS NULL THEN excluded.serverBuy ELSE diff_history.serverBuy END,
        serverSell = CASE WHEN diff_history.serverSell IS NULL THEN excluded.serverSell ELSE diff_history.serverSell END,
        dexVolume = COALESCE(excluded.dexVolume, diff_history.dexVolume),
        rejectReason = COALESCE(excluded.rejectReason, diff_history.rejectReason)
"#;

const SELECT_DIFF: &str = r#"
    SELECT dh.curId, dh.ts, dh.buyDiffBps, dh.sellDiffBps, dh.cexVol,
           dh.serverBuy, dh.serverSell, dh.dexVolume, dh.rejectReason
    FROM diff_history dh
"#;

type DiffTuple = (
    String,
    i64,
    Option<i64>,
    Option<i64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<String>,
);

fn snapshot_from_tuple(row: DiffTuple) -> DiffSnapshot {
    let (cur_id, ts, buy_diff_bps, sell_diff_bps, cex_vol, server_buy, server_sell, dex_volume, reject_reason) =
        row;
    DiffSnapshot {
        cur_id,
        ts,
        buy_diff_bps,
        sell_diff_bps,
        cex_vol,
        server_buy,
        server_sell,
        dex_volume,
        reject_reason,
    }
}

/// Most recent quote for `name`, trying the exact name, then upper then
/// lower case.
pub(crate) async fn lookup_quote(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<StoredQuote>, StoreError> {
    let mut candidates = vec![name.to_string()];
    for variant in [name.to_uppercase(), name.to_lowercase()] {
        if !candidates.contains(&variant) {
            candidates.push(variant);
        }
    }

    for candidate in candidates {
        let row = sqlx::query_as::<_, (Option<f64>, Option<f64>)>(
            "SELECT buy, sell FROM server_tokens WHERE name = ? ORDER BY timestamp DESC, id DESC LIMIT 1",
        )
        .bind(&candidate)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some((buy, sell)) = row {
            return Ok(Some(StoredQuote { buy, sell }));
        }
    }
    Ok(None)
}

impl ServerStore {
    /// Merge a batch of snapshots atomically. Returns the number of rows written.
    ///
    /// Rows arriving without a server quote are enriched from the latest
    /// token quote; lookups are cached per token name for the batch.
    pub async fn merge_diff_snapshots(&self, rows: &[DiffSnapshot]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut quote_cache: HashMap<String, Option<StoredQuote>> = HashMap::new();

        for row in rows {
            let mut candidate = row.clone();

            if !candidate.has_server_quote() {
                if let Some(name) = row.token_name() {
                    let quote = match quote_cache.get(name) {
                        Some(cached) => *cached,
                        None => {
                            let found = lookup_quote(&mut *tx, name).await?;
                            quote_cache.insert(name.to_string(), found);
                            found
                        }
                    };
                    if let Some(quote) = quote {
                        candidate.server_buy = quote.buy;
                        candidate.server_sell = quote.sell;
                    }
                }
            }

            sqlx::query(UPSERT_DIFF)
                .bind(&candidate.cur_id)
                .bind(candidate.ts)
                .bind(candidate.buy_diff_bps)
                .bind(candidate.sell_diff_bps)
                .bind(candidate.cex_vol)
                .bind(candidate.server_buy)
                .bind(candidate.server_sell)
                .bind(candidate.dex_volume)
                .bind(&candidate.reject_reason)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(rows = rows.len(), tokens = quote_cache.len(), "Merged diff snapshots");
        Ok(rows.len())
    }

    pub async fn diff_snapshot(&self, cur_id: &str, ts: i64) -> Result<Option<DiffSnapshot>, StoreError> {
        let sql = format!("{} WHERE dh.curId = ? AND dh.ts = ?", SELECT_DIFF);
        let row = sqlx::query_as::<_, DiffTuple>(&sql)
            .bind(cur_id)
            .bind(ts)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(snapshot_from_tuple))
    }

    /// The newest snapshot of every route.
    pub async fn latest_diff_per_cur(&self) -> Result<Vec<DiffSnapshot>, StoreError> {
        let sql = format!(
            r#"{}
            JOIN (
                SELECT curId, MAX(ts) AS maxTs
                FROM diff_history
                GROUP BY curId
            ) latest ON latest.curId = dh.curId AND latest.maxTs = dh.ts
            ORDER BY dh.curId"#,
            SELECT_DIFF
        );
        let rows = sqlx::query_as::<_, DiffTuple>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(snapshot_from_tuple).collect())
    }
}
