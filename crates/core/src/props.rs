//! Trade metadata normalizer.
//!
//! Upstream bots encode the `props` blob of a completed trade in several
//! shapes. [`normalize_props`] maps all of them onto one [`TradeFeatures`]
//! record and never fails: anything it cannot read yields an empty record.

use crate::value::safe_number;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Execution-style keys used by the heuristic encoding.
pub const EXEC_VOCABULARY: [&str; 5] = ["Market", "Limit", "PostOnly", "IOC", "FOK"];

const CANONICAL_KEYS: [&str; 5] = ["Diff", "DexSlip", "CexSlip", "Dex", "Exec"];

/// Canonical feature record extracted from trade metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeFeatures {
    #[serde(rename = "Diff", default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<f64>,
    #[serde(rename = "DexSlip", default, skip_serializing_if = "Option::is_none")]
    pub dex_slip: Option<f64>,
    #[serde(rename = "CexSlip", default, skip_serializing_if = "Option::is_none")]
    pub cex_slip: Option<f64>,
    #[serde(rename = "Dex", default, skip_serializing_if = "Option::is_none")]
    pub dex: Option<String>,
    #[serde(rename = "Exec", default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<String>,
}

impl TradeFeatures {
    pub fn is_empty(&self) -> bool {
        self.diff.is_none()
            && self.dex_slip.is_none()
            && self.cex_slip.is_none()
            && self.dex.is_none()
            && self.exec.is_none()
    }

    /// Serialized form, or `None` when nothing was extracted.
    pub fn to_json(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        serde_json::to_string(self).ok()
    }
}

/// Known metadata encodings, in detection priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum PropsShape {
    /// Object that already exposes at least one canonical key.
    Canonical(Map<String, Value>),
    /// Object such as `{"SOME_link":"SELL","0.14":"0.06","Market":"0.27"}`.
    Heuristic(Map<String, Value>),
    /// Not structured data.
    Unparseable,
}

impl PropsShape {
    /// Classify a raw blob: a JSON object, or a string holding one.
    pub fn detect(raw: &Value) -> Self {
        let map = match raw {
            Value::Object(map) => map.clone(),
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => map,
                _ => return PropsShape::Unparseable,
            },
            _ => return PropsShape::Unparseable,
        };

        let has_canonical = CANONICAL_KEYS
            .iter()
            .any(|key| map.get(*key).is_some_and(|v| !v.is_null()));
        if has_canonical {
            PropsShape::Canonical(map)
        } else {
            PropsShape::Heuristic(map)
        }
    }

    pub fn extract(&self) -> TradeFeatures {
        match self {
            PropsShape::Canonical(map) => extract_canonical(map),
            PropsShape::Heuristic(map) => extract_heuristic(map),
            PropsShape::Unparseable => TradeFeatures::default(),
        }
    }
}

/// Normalize a trade's `props` blob into canonical features.
pub fn normalize_props(raw: &Value) -> TradeFeatures {
    PropsShape::detect(raw).extract()
}

/// Normalize a `props` blob given as text.
pub fn normalize_props_str(raw: &str) -> TradeFeatures {
    normalize_props(&Value::String(raw.to_string()))
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn extract_canonical(map: &Map<String, Value>) -> TradeFeatures {
    TradeFeatures {
        diff: map.get("Diff").and_then(safe_number),
        dex_slip: map.get("DexSlip").and_then(safe_number),
        cex_slip: map.get("CexSlip").and_then(safe_number),
        dex: map.get("Dex").and_then(text_of),
        exec: map.get("Exec").and_then(text_of),
    }
}

fn extract_heuristic(map: &Map<String, Value>) -> TradeFeatures {
    let mut features = TradeFeatures::default();

    if let Some(exec) = EXEC_VOCABULARY.iter().find(|key| map.contains_key(**key)) {
        features.exec = Some((*exec).to_string());
        features.cex_slip = map.get(*exec).and_then(safe_number);
    }

    features.dex = map.values().find_map(|value| match value.as_str() {
        Some(side @ ("BUY" | "SELL")) => Some(side.to_string()),
        _ => None,
    });

    let numeric_pair = map.iter().find_map(|(key, value)| {
        let key = safe_number(&Value::String(key.clone()))?;
        let value = safe_number(value)?;
        Some((key, value))
    });
    if let Some((diff, dex_slip)) = numeric_pair {
        features.diff = Some(diff);
        features.dex_slip = Some(dex_slip);
    }

    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_heuristic_encoding() {
        let raw = json!(r#"{"SOME_link":"SELL","0.14":"0.06","Market":"0.27"}"#);
        let features = normalize_props(&raw);
        assert_eq!(
            features,
            TradeFeatures {
                diff: Some(0.14),
                dex_slip: Some(0.06),
                cex_slip: Some(0.27),
                dex: Some("SELL".to_string()),
                exec: Some("Market".to_string()),
            }
        );
    }

    #[test]
    fn test_heuristic_encoding_as_object() {
        let raw = json!({"LINK_x": "BUY", "IOC": "0.5"});
        let features = normalize_props(&raw);
        assert_eq!(features.exec.as_deref(), Some("IOC"));
        assert_eq!(features.cex_slip, Some(0.5));
        assert_eq!(features.dex.as_deref(), Some("BUY"));
        assert_eq!(features.diff, None);
    }

    #[test]
    fn test_canonical_encoding_is_coerced() {
        let raw = json!({"Diff": "0.3", "DexSlip": 0.1, "Dex": "BUY", "Exec": "Limit", "Other": 1});
        let features = normalize_props(&raw);
        assert_eq!(features.diff, Some(0.3));
        assert_eq!(features.dex_slip, Some(0.1));
        assert_eq!(features.cex_slip, None);
        assert_eq!(features.exec.as_deref(), Some("Limit"));
    }

    #[test]
    fn test_canonical_wins_over_heuristic_keys() {
        let raw = json!({"Diff": 1, "0.5": "0.2", "Market": "9"});
        let features = normalize_props(&raw);
        assert_eq!(features.diff, Some(1.0));
        assert_eq!(features.exec, None);
        assert_eq!(features.dex_slip, None);
    }

    #[test]
    fn test_unparseable_input_yields_empty() {
        assert!(normalize_props_str("not json").is_empty());
        assert!(normalize_props(&json!("[1,2,3]")).is_empty());
        assert!(normalize_props(&json!(42)).is_empty());
        assert!(normalize_props(&Value::Null).is_empty());
        assert_eq!(normalize_props_str("not json").to_json(), None);
    }

    #[test]
    fn test_features_serialize_with_canonical_names() {
        let features = TradeFeatures {
            diff: Some(0.14),
            exec: Some("Market".to_string()),
            ..Default::default()
        };
        assert_eq!(
            features.to_json().unwrap(),
            r#"{"Diff":0.14,"Exec":"Market"}"#
        );
    }
}
