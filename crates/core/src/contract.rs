//! On-chain contract transactions reported by a block explorer.

use crate::value::{safe_int, safe_string};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chain native coin, picked from the server's explorer site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeAsset {
    Eth,
    Pol,
    Bnb,
}

impl NativeAsset {
    pub fn for_explorer_site(site: Option<&str>) -> Self {
        let site = site.unwrap_or("");
        if site.contains("polygonscan") {
            NativeAsset::Pol
        } else if site.contains("bscscan") {
            NativeAsset::Bnb
        } else {
            NativeAsset::Eth
        }
    }

    /// Ticker symbol on the USDT spot market.
    pub fn ticker_symbol(&self) -> &'static str {
        match self {
            NativeAsset::Eth => "ETHUSDT",
            NativeAsset::Pol => "POLUSDT",
            NativeAsset::Bnb => "BNBUSDT",
        }
    }
}

/// Latest known USD prices of the native coins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NativePrices {
    pub eth: Option<f64>,
    pub pol: Option<f64>,
    pub bnb: Option<f64>,
}

impl NativePrices {
    pub fn get(&self, asset: NativeAsset) -> Option<f64> {
        match asset {
            NativeAsset::Eth => self.eth,
            NativeAsset::Pol => self.pol,
            NativeAsset::Bnb => self.bnb,
        }
    }

    pub fn set(&mut self, asset: NativeAsset, price: f64) {
        let slot = match asset {
            NativeAsset::Eth => &mut self.eth,
            NativeAsset::Pol => &mut self.pol,
            NativeAsset::Bnb => &mut self.bnb,
        };
        *slot = Some(price);
    }

    /// Keep only the price of `asset`; the others are stored as null.
    pub fn only(&self, asset: NativeAsset) -> Self {
        let mut out = Self::default();
        if let Some(price) = self.get(asset) {
            out.set(asset, price);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractTx {
    pub hash: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub is_error: bool,
    /// Failure reason, only set for failed transactions.
    pub reason: Option<String>,
    pub prices: NativePrices,
    pub raw_data: String,
}

impl ContractTx {
    /// Build from one explorer `txlist` entry. Entries without a hash are dropped.
    pub fn from_explorer_value(raw: &Value, prices: NativePrices) -> Option<Self> {
        let obj = raw.as_object()?;
        let hash = obj.get("hash").and_then(safe_string)?;
        let timestamp = obj.get("timeStamp").and_then(safe_int).unwrap_or(0) * 1000;

        let error_flag = ["isError", "errorCode"]
            .iter()
            .filter_map(|k| obj.get(*k).and_then(safe_string))
            .find(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "0".to_string());
        let is_error = error_flag.trim() != "0";

        let reason = is_error.then(|| {
            if obj.get("txreceipt_status").and_then(Value::as_str) == Some("0") {
                "Reverted".to_string()
            } else {
                ["errDescription", "revertReason"]
                    .iter()
                    .filter_map(|k| obj.get(*k).and_then(safe_string))
                    .find(|v| !v.is_empty())
                    .unwrap_or_else(|| "Unknown".to_string())
            }
        });

        Some(Self {
            hash,
            timestamp,
            is_error,
            reason,
            prices,
            raw_data: raw.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_native_asset_by_site() {
        assert_eq!(NativeAsset::for_explorer_site(Some("https://polygonscan.com")), NativeAsset::Pol);
        assert_eq!(NativeAsset::for_explorer_site(Some("https://bscscan.com")), NativeAsset::Bnb);
        assert_eq!(NativeAsset::for_explorer_site(Some("https://arbiscan.io")), NativeAsset::Eth);
        assert_eq!(NativeAsset::for_explorer_site(None), NativeAsset::Eth);
    }

    #[test]
    fn test_reverted_transaction() {
        let prices = NativePrices {
            eth: Some(3000.0),
            pol: Some(0.5),
            bnb: None,
        };
        let raw = json!({
            "hash": "0xaa",
            "timeStamp": "1700000000",
            "isError": "1",
            "txreceipt_status": "0"
        });
        let tx = ContractTx::from_explorer_value(&raw, prices.only(NativeAsset::Eth)).unwrap();
        assert_eq!(tx.timestamp, 1_700_000_000_000);
        assert!(tx.is_error);
        assert_eq!(tx.reason.as_deref(), Some("Reverted"));
        assert_eq!(tx.prices.eth, Some(3000.0));
        assert_eq!(tx.prices.pol, None);
    }

    #[test]
    fn test_successful_transaction_has_no_reason() {
        let raw = json!({"hash": "0xbb", "timeStamp": 5, "isError": "0", "errDescription": "x"});
        let tx = ContractTx::from_explorer_value(&raw, NativePrices::default()).unwrap();
        assert!(!tx.is_error);
        assert_eq!(tx.reason, None);
    }

    #[test]
    fn test_error_code_and_description() {
        let raw = json!({"hash": "0xcc", "timeStamp": 5, "errorCode": "7", "errDescription": "out of gas"});
        let tx = ContractTx::from_explorer_value(&raw, NativePrices::default()).unwrap();
        assert_eq!(tx.reason.as_deref(), Some("out of gas"));
        assert!(ContractTx::from_explorer_value(&json!({"timeStamp": 1}), NativePrices::default()).is_none());
    }
}
