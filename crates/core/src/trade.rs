//! Completed trade records.

use crate::props::{normalize_props, TradeFeatures};
use crate::value::{safe_int, safe_number, safe_string};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Exchange fee rate applied to the destination leg of net profit.
pub const NET_PROFIT_FEE_RATE: f64 = 0.0002;

/// A completed trade as reported by an upstream bot, after sanitizing.
///
/// Keyed by the upstream-assigned `id`. Stored rows are never overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletedTrade {
    pub id: i64,
    pub fsm_type: Option<String>,
    pub pair: Option<String>,
    pub src_exchange: Option<String>,
    pub dst_exchange: Option<String>,
    pub status: Option<String>,
    pub user: Option<String>,
    pub estimated_profit_normalized: Option<f64>,
    pub estimated_profit: Option<f64>,
    pub estimated_gross_profit: Option<f64>,
    pub eta: Option<String>,
    pub estimated_src_price: Option<f64>,
    pub estimated_dst_price: Option<f64>,
    pub estimated_qty: Option<f64>,
    pub executed_profit_normalized: Option<f64>,
    pub executed_profit: Option<f64>,
    pub executed_gross_profit: Option<f64>,
    pub executed_time: Option<i64>,
    pub executed_src_price: Option<f64>,
    pub executed_dst_price: Option<f64>,
    pub executed_qty_src: Option<f64>,
    pub executed_qty_dst: Option<f64>,
    pub executed_fee_total: Option<f64>,
    pub executed_fee_percent: Option<f64>,
    /// Normalized features as JSON when extraction succeeded, else the raw text.
    pub props: Option<String>,
    pub creation_time: Option<i64>,
    pub open_time: Option<i64>,
    pub last_update_time: Option<i64>,
    pub nw_id: Option<String>,
    pub tx_fee: Option<f64>,
    pub calculated_volume: Option<f64>,
    pub conveyed_volume: Option<f64>,
    pub commission_percent: Option<f64>,
    pub hedge: Option<bool>,
    pub raw_data: String,
}

impl CompletedTrade {
    /// Sanitize one upstream trade object. Returns `None` without an integer id.
    pub fn from_value(raw: &Value) -> Option<Self> {
        let obj = raw.as_object()?;
        let id = obj.get("id").and_then(safe_int)?;

        let num = |key: &str| obj.get(key).and_then(safe_number);
        let int = |key: &str| obj.get(key).and_then(safe_int);
        let text = |key: &str| obj.get(key).and_then(safe_string);

        let props = match obj.get("props") {
            None | Some(Value::Null) => None,
            Some(raw_props) => {
                let features = normalize_props(raw_props);
                features.to_json().or_else(|| match raw_props {
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
            }
        };

        Some(Self {
            id,
            fsm_type: text("fsmType"),
            pair: text("pair"),
            src_exchange: text("srcExchange"),
            dst_exchange: text("dstExchange"),
            status: text("status"),
            user: text("user"),
            estimated_profit_normalized: num("estimatedProfitNormalized"),
            estimated_profit: num("estimatedProfit"),
            estimated_gross_profit: num("estimatedGrossProfit"),
            eta: text("eta"),
            estimated_src_price: num("estimatedSrcPrice"),
            estimated_dst_price: num("estimatedDstPrice"),
            estimated_qty: num("estimatedQty"),
            executed_profit_normalized: num("executedProfitNormalized"),
            executed_profit: num("executedProfit"),
            executed_gross_profit: num("executedGrossProfit"),
            executed_time: int("executedTime"),
            executed_src_price: num("executedSrcPrice"),
            executed_dst_price: num("executedDstPrice"),
            executed_qty_src: num("executedQtySrc"),
            executed_qty_dst: num("executedQtyDst"),
            executed_fee_total: num("executedFeeTotal"),
            executed_fee_percent: num("executedFeePercent"),
            props,
            creation_time: int("creationTime"),
            open_time: int("openTime"),
            last_update_time: int("lastUpdateTime"),
            nw_id: text("nwId"),
            tx_fee: num("txFee"),
            calculated_volume: num("calculatedVolume"),
            conveyed_volume: num("conveyedVolume"),
            commission_percent: num("commissionPercent"),
            hedge: obj.get("hedge").and_then(Value::as_bool),
            raw_data: raw.to_string(),
        })
    }

    /// Sanitize an upstream trade list.
    ///
    /// Returns `None` when the payload is not an array at all, so callers can
    /// tell a malformed payload apart from an empty one.
    pub fn parse_list(payload: &Value) -> Option<Vec<Self>> {
        let items = payload.as_array()?;
        Some(items.iter().filter_map(Self::from_value).collect())
    }

    pub fn features(&self) -> TradeFeatures {
        self.props
            .as_deref()
            .map(crate::props::normalize_props_str)
            .unwrap_or_default()
    }
}

/// Executed legs of a trade, as needed for profit evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeLegs {
    pub src_price: Option<f64>,
    pub dst_price: Option<f64>,
    pub qty_src: Option<f64>,
    pub qty_dst: Option<f64>,
}

impl TradeLegs {
    /// `qtyDst*dstPrice - srcPrice*qtySrc - fee*qtyDst*dstPrice`.
    ///
    /// `None` if any leg is missing or the result is not finite.
    pub fn net_profit(&self) -> Option<f64> {
        let dst_value = self.qty_dst? * self.dst_price?;
        let src_value = self.src_price? * self.qty_src?;
        let profit = dst_value - src_value - NET_PROFIT_FEE_RATE * dst_value;
        profit.is_finite().then_some(profit)
    }
}

impl From<&CompletedTrade> for TradeLegs {
    fn from(trade: &CompletedTrade) -> Self {
        Self {
            src_price: trade.executed_src_price,
            dst_price: trade.executed_dst_price,
            qty_src: trade.executed_qty_src,
            qty_dst: trade.executed_qty_dst,
        }
    }
}
