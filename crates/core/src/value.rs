//! Lenient coercion helpers for loosely-typed upstream JSON.

use serde_json::Value;

/// Coerce a JSON value into a finite number.
///
/// Numbers pass through, numeric strings are parsed after trimming.
/// Everything else (including empty strings, booleans and NaN) is `None`.
pub fn safe_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Coerce a JSON value into an integer, truncating fractional input.
///
/// Strings are read up to the first non-digit, so `"1700000000000ms"`
/// still yields a timestamp.
pub fn safe_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            let end = trimmed
                .char_indices()
                .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
                .map(|(i, _)| i)
                .unwrap_or(trimmed.len());
            trimmed[..end].parse::<i64>().ok()
        }
        _ => None,
    }
}

/// Render a scalar JSON value as text; `null` and containers yield `None`.
pub fn safe_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Split a recipient-style list on commas, semicolons or whitespace.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_safe_number() {
        assert_eq!(safe_number(&json!(1.5)), Some(1.5));
        assert_eq!(safe_number(&json!(" 0.27 ")), Some(0.27));
        assert_eq!(safe_number(&json!("")), None);
        assert_eq!(safe_number(&json!("abc")), None);
        assert_eq!(safe_number(&json!(true)), None);
        assert_eq!(safe_number(&json!(null)), None);
        assert_eq!(safe_number(&json!("NaN")), None);
    }

    #[test]
    fn test_safe_int() {
        assert_eq!(safe_int(&json!(42)), Some(42));
        assert_eq!(safe_int(&json!(42.9)), Some(42));
        assert_eq!(safe_int(&json!("1700000000000")), Some(1_700_000_000_000));
        assert_eq!(safe_int(&json!("12abc")), Some(12));
        assert_eq!(safe_int(&json!("-7")), Some(-7));
        assert_eq!(safe_int(&json!("x")), None);
        assert_eq!(safe_int(&json!(null)), None);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list("a@x.io, b@x.io;c@x.io  d@x.io"),
            vec!["a@x.io", "b@x.io", "c@x.io", "d@x.io"]
        );
        assert!(split_list(" ,; ").is_empty());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hi", 10), "hi");
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
