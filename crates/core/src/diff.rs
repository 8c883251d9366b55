//! Market diff snapshots.

use crate::value::{safe_int, safe_number, safe_string};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One diff observation keyed by `(cur_id, ts)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSnapshot {
    pub cur_id: String,
    pub ts: i64,
    pub buy_diff_bps: Option<i64>,
    pub sell_diff_bps: Option<i64>,
    pub cex_vol: Option<f64>,
    pub server_buy: Option<f64>,
    pub server_sell: Option<f64>,
    pub dex_volume: Option<f64>,
    pub reject_reason: Option<String>,
}

impl DiffSnapshot {
    pub fn new(cur_id: impl Into<String>, ts: i64) -> Self {
        Self {
            cur_id: cur_id.into(),
            ts,
            ..Default::default()
        }
    }

    /// Sanitize one upstream diff row. Rows without `curId` or an integer
    /// `ts` are dropped.
    pub fn from_value(raw: &Value) -> Option<Self> {
        let obj = raw.as_object()?;
        let cur_id = obj.get("curId").and_then(safe_string)?;
        let ts = obj.get("ts").and_then(safe_int)?;

        Some(Self {
            cur_id,
            ts,
            buy_diff_bps: obj.get("buyDiffBps").and_then(safe_int),
            sell_diff_bps: obj.get("sellDiffBps").and_then(safe_int),
            cex_vol: obj.get("cexVol").and_then(safe_number),
            server_buy: obj.get("serverBuy").and_then(safe_number),
            server_sell: obj.get("serverSell").and_then(safe_number),
            dex_volume: obj.get("dexLiq").and_then(safe_number),
            reject_reason: obj.get("rr").and_then(safe_string),
        })
    }

    /// Sanitize an upstream diff list; `None` if the payload is not an array.
    pub fn parse_list(payload: &Value) -> Option<Vec<Self>> {
        let items = payload.as_array()?;
        Some(items.iter().filter_map(Self::from_value).collect())
    }

    pub fn token_name(&self) -> Option<&str> {
        token_name_from_cur_id(&self.cur_id)
    }

    pub fn has_server_quote(&self) -> bool {
        self.server_buy.is_some() || self.server_sell.is_some()
    }
}

/// Token name embedded in a route id: the second non-empty `_` part,
/// else the first.
///
/// ```
/// use fleet_core::token_name_from_cur_id;
/// assert_eq!(token_name_from_cur_id("BNB_LINK_0x12"), Some("LINK"));
/// assert_eq!(token_name_from_cur_id("LINK"), Some("LINK"));
/// ```
pub fn token_name_from_cur_id(cur_id: &str) -> Option<&str> {
    let mut parts = cur_id.split('_').filter(|p| !p.is_empty());
    let first = parts.next()?;
    Some(parts.next().unwrap_or(first))
}
