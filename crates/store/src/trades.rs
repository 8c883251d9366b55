//! Completed trades: insert-or-ignore writes and evaluator reads.

use crate::db::{ServerStore, StoreError};
use fleet_core::{normalize_props_str, CompletedTrade, TradeFeatures, TradeLegs};
use serde::Serialize;
use tracing::debug;

const INSERT_TRADE: &str = r#"
    INSERT OR IGNORE INTO completed_trades (
        id, fsmType, pair, srcExchange, dstExchange, status, user,
        estimatedProfitNormalized, estimatedProfit, estimatedGrossProfit, eta,
        estimatedSrcPrice, estimatedDstPrice, estimatedQty,
        executedProfitNormalized, executedProfit, executedGrossProfit, executedTime,
        executedSrcPrice, executedDstPrice, executedQtySrc, executedQtyDst,
        executedFeeTotal, executedFeePercent, props, creationTime, openTime, lastUpdateTime,
        nwId, txFee, calculatedVolume, conveyedVolume, commissionPercent, hedge, raw_data
    ) VALUES (
        ?, ?, ?, ?, ?, ?, ?,
        ?, ?, ?, ?,
        ?, ?, ?,
        ?, ?, ?, ?,
        ?, ?, ?, ?,
        ?, ?, ?, ?, ?, ?,
        ?, ?, ?, ?, ?, ?, ?
    )
"#;

const SELECT_TRADE_ROW: &str = r#"
    SELECT id, pair, executedSrcPrice, executedDstPrice, executedQtySrc, executedQtyDst,
           executedProfitNormalized, executedGrossProfit, executedFeeTotal, props,
           lastUpdateTime, raw_data
    FROM completed_trades
"#;

type TradeTuple = (
    i64,
    Option<String>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<String>,
    Option<i64>,
    Option<String>,
);

/// The stored columns evaluators and digests work with.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeRow {
    pub id: i64,
    pub pair: Option<String>,
    pub executed_src_price: Option<f64>,
    pub executed_dst_price: Option<f64>,
    pub executed_qty_src: Option<f64>,
    pub executed_qty_dst: Option<f64>,
    pub executed_profit_normalized: Option<f64>,
    pub executed_gross_profit: Option<f64>,
    pub executed_fee_total: Option<f64>,
    pub props: Option<String>,
    pub last_update_time: Option<i64>,
    pub raw_data: Option<String>,
}

impl TradeRow {
    pub fn legs(&self) -> TradeLegs {
        TradeLegs {
            src_price: self.executed_src_price,
            dst_price: self.executed_dst_price,
            qty_src: self.executed_qty_src,
            qty_dst: self.executed_qty_dst,
        }
    }

    pub fn net_profit(&self) -> Option<f64> {
        self.legs().net_profit()
    }

    pub fn features(&self) -> TradeFeatures {
        self.props
            .as_deref()
            .map(normalize_props_str)
            .unwrap_or_default()
    }
}

impl From<TradeTuple> for TradeRow {
    fn from(row: TradeTuple) -> Self {
        let (
            id,
            pair,
            executed_src_price,
            executed_dst_price,
            executed_qty_src,
            executed_qty_dst,
            executed_profit_normalized,
            executed_gross_profit,
            executed_fee_total,
            props,
            last_update_time,
            raw_data,
        ) = row;
        Self {
            id,
            pair,
            executed_src_price,
            executed_dst_price,
            executed_qty_src,
            executed_qty_dst,
            executed_profit_normalized,
            executed_gross_profit,
            executed_fee_total,
            props,
            last_update_time,
            raw_data,
        }
    }
}

impl From<&CompletedTrade> for TradeRow {
    fn from(trade: &CompletedTrade) -> Self {
        Self {
            id: trade.id,
            pair: trade.pair.clone(),
            executed_src_price: trade.executed_src_price,
            executed_dst_price: trade.executed_dst_price,
            executed_qty_src: trade.executed_qty_src,
            executed_qty_dst: trade.executed_qty_dst,
            executed_profit_normalized: trade.executed_profit_normalized,
            executed_gross_profit: trade.executed_gross_profit,
            executed_fee_total: trade.executed_fee_total,
            props: trade.props.clone(),
            last_update_time: trade.last_update_time,
            raw_data: Some(trade.raw_data.clone()),
        }
    }
}

/// Gross profit aggregated per pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairProfit {
    pub pair: Option<String>,
    pub trades: i64,
    pub gross_profit: Option<f64>,
}

impl ServerStore {
    /// Insert trades that are not stored yet, in one transaction.
    ///
    /// Existing ids are left untouched. Returns the ids that were new.
    pub async fn insert_completed_trades(
        &self,
        trades: &[CompletedTrade],
    ) -> Result<Vec<i64>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::new();

        for t in trades {
            let result = sqlx::query(INSERT_TRADE)
                .bind(t.id)
                .bind(&t.fsm_type)
                .bind(&t.pair)
                .bind(&t.src_exchange)
                .bind(&t.dst_exchange)
                .bind(&t.status)
                .bind(&t.user)
                .bind(t.estimated_profit_normalized)
                .bind(t.estimated_profit)
                .bind(t.estimated_gross_profit)
                .bind(&t.eta)
                .bind(t.estimated_src_price)
                .bind(t.estimated_dst_price)
                .bind(t.estimated_qty)
                .bind(t.executed_profit_normalized)
                .bind(t.executed_profit)
                .bind(t.executed_gross_profit)
                .bind(t.executed_time)
                .bind(t.executed_src_price)
                .bind(t.executed_dst_price)
                .bind(t.executed_qty_src)
                .bind(t.executed_qty_dst)
                .bind(t.executed_fee_total)
                .bind(t.executed_fee_percent)
                .bind(&t.props)
                .bind(t.creation_time)
                .bind(t.open_time)
                .bind(t.last_update_time)
                .bind(&t.nw_id)
                .bind(t.tx_fee)
                .bind(t.calculated_volume)
                .bind(t.conveyed_volume)
                .bind(t.commission_percent)
                .bind(t.hedge)
                .bind(&t.raw_data)
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() > 0 {
                inserted.push(t.id);
            }
        }

        tx.commit().await?;
        debug!(inserted = inserted.len(), total = trades.len(), "Stored completed trades");
        Ok(inserted)
    }

    pub async fn trade(&self, id: i64) -> Result<Option<TradeRow>, StoreError> {
        let sql = format!("{} WHERE id = ?", SELECT_TRADE_ROW);
        let row = sqlx::query_as::<_, TradeTuple>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(TradeRow::from))
    }

    pub async fn trade_count(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM completed_trades")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Trades whose `lastUpdateTime` is at or after `since_millis`, newest first.
    pub async fn trades_updated_since(&self, since_millis: i64) -> Result<Vec<TradeRow>, StoreError> {
        let sql = format!(
            "{} WHERE lastUpdateTime >= ? ORDER BY lastUpdateTime DESC",
            SELECT_TRADE_ROW
        );
        let rows = sqlx::query_as::<_, TradeTuple>(&sql)
            .bind(since_millis)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(TradeRow::from).collect())
    }

    /// Pairs ranked by summed gross profit since `since_millis`.
    pub async fn top_pairs_since(
        &self,
        since_millis: i64,
        limit: i64,
    ) -> Result<Vec<PairProfit>, StoreError> {
        let rows = sqlx::query_as::<_, (Option<String>, i64, Option<f64>)>(
            r#"
            SELECT pair, COUNT(*) AS count, SUM(executedGrossProfit) AS totalProfit
            FROM completed_trades
            WHERE lastUpdateTime >= ?
            GROUP BY pair
            ORDER BY totalProfit DESC
            LIMIT ?
            "#,
        )
        .bind(since_millis)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(pair, trades, gross_profit)| PairProfit {
                pair,
                trades,
                gross_profit,
            })
            .collect())
    }
}
