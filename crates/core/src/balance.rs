//! Exchange balance snapshots.

use crate::value::safe_number;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only centralized venue; its balance is reported in USDT terms.
pub const CEX_EXCHANGE: &str = "BinanceF";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub total_usdt: Option<f64>,
    pub total_coin: Option<f64>,
    pub raw_data: String,
}

impl BalanceSnapshot {
    /// Build a snapshot from the per-exchange balance object.
    ///
    /// Returns `None` when the payload is not an object.
    pub fn from_value(raw: &Value) -> Option<Self> {
        raw.as_object()?;
        let split = DexCexSplit::from_value(raw);
        let total = split.combined();
        Some(Self {
            total_usdt: total.is_finite().then_some(total),
            total_coin: None,
            raw_data: raw.to_string(),
        })
    }
}

/// Per-snapshot DEX and CEX totals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DexCexSplit {
    pub dex_total: f64,
    pub cex_total: f64,
}

impl DexCexSplit {
    pub fn from_value(raw: &Value) -> Self {
        let mut split = Self::default();
        let Some(exchanges) = raw.as_object() else {
            return split;
        };

        for (name, exchange) in exchanges {
            if !exchange.is_object() {
                continue;
            }
            if name == CEX_EXCHANGE {
                split.cex_total += exchange.get("usdtVal").and_then(safe_number).unwrap_or(0.0);
            } else {
                split.dex_total += exchange.get("coinVal").and_then(safe_number).unwrap_or(0.0);
            }
        }
        split
    }

    pub fn from_raw(raw: &str) -> Self {
        serde_json::from_str::<Value>(raw)
            .map(|v| Self::from_value(&v))
            .unwrap_or_default()
    }

    pub fn combined(&self) -> f64 {
        self.dex_total + self.cex_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_totals_split_by_venue() {
        let raw = json!({
            "BinanceF": {"usdtVal": "1000.5", "coinVal": 3},
            "Uniswap": {"coinVal": 250, "usdtVal": 999},
            "Pancake": {"coinVal": "bad"},
            "note": "ignored"
        });
        let split = DexCexSplit::from_value(&raw);
        assert_eq!(split.cex_total, 1000.5);
        assert_eq!(split.dex_total, 250.0);

        let snapshot = BalanceSnapshot::from_value(&raw).unwrap();
        assert_eq!(snapshot.total_usdt, Some(1250.5));
        assert_eq!(snapshot.total_coin, None);
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(BalanceSnapshot::from_value(&json!([1, 2])).is_none());
        assert_eq!(DexCexSplit::from_raw("not json"), DexCexSplit::default());
    }
}
