//! Threshold rule resolution for the evaluators.
//!
//! Trade rules read from two keys: a dispatch key (`profit-trade`,
//! `high-profit-trade`) whose values win, and an older threshold key
//! (`profit`, `high-profit`) used to fill what the dispatch key leaves unset.

use fleet_core::{NotificationRule, NotificationRules};

pub const PROFIT_RULE: &str = "profit-trade";
pub const HIGH_PROFIT_RULE: &str = "high-profit-trade";
pub const LOW_CEX_VOLUME_RULE: &str = "lowCexVolume";
pub const LOW_GAS_RULE: &str = "lowGas";
pub const POLL_FAILED_RULE: &str = "pollFailed";
pub const HOURLY_DIGEST_RULE: &str = "hourlyDigest";
pub const DAILY_DIGEST_RULE: &str = "dailyDigest";
pub const BALANCE_UPDATE_RULE: &str = "balanceUpdate";

const PROFIT_THRESHOLD_KEY: &str = "profit";
const HIGH_PROFIT_THRESHOLD_KEY: &str = "high-profit";

pub const DEFAULT_LOW_GAS_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRule {
    pub threshold: f64,
    pub cooldown_minutes: f64,
    pub channels: Vec<String>,
}

/// Low-profit trades: fires below the threshold (default -5, cooldown 30).
pub fn resolve_profit_rule(rules: &NotificationRules) -> ResolvedRule {
    resolve_trade_rule(rules, PROFIT_RULE, PROFIT_THRESHOLD_KEY, -5.0, 30.0)
}

/// High-profit trades: fires at or above the threshold (default 100, cooldown 60).
pub fn resolve_high_profit_rule(rules: &NotificationRules) -> ResolvedRule {
    resolve_trade_rule(rules, HIGH_PROFIT_RULE, HIGH_PROFIT_THRESHOLD_KEY, 100.0, 60.0)
}

pub fn resolve_low_cex_volume_rule(rules: &NotificationRules) -> ResolvedRule {
    let rule = rules.get(LOW_CEX_VOLUME_RULE);
    ResolvedRule {
        threshold: finite(rule.and_then(|r| r.threshold)).unwrap_or(10.0),
        cooldown_minutes: positive(rule.and_then(|r| r.cooldown_minutes)).unwrap_or(5.0),
        channels: rule.map(|r| clean_channels(&r.channels)).unwrap_or_default(),
    }
}

pub fn resolve_low_gas_threshold(rules: &NotificationRules) -> f64 {
    finite(rules.get(LOW_GAS_RULE).and_then(|r| r.threshold)).unwrap_or(DEFAULT_LOW_GAS_THRESHOLD)
}

/// Digest channels: the rule's own list, else `fallback`.
pub fn digest_channels(rules: &NotificationRules, key: &str, fallback: &[&str]) -> Vec<String> {
    let configured = rules
        .get(key)
        .map(|r| clean_channels(&r.channels))
        .unwrap_or_default();
    if configured.is_empty() {
        fallback.iter().map(|c| c.to_string()).collect()
    } else {
        configured
    }
}

fn resolve_trade_rule(
    rules: &NotificationRules,
    dispatch_key: &str,
    threshold_key: &str,
    fallback_threshold: f64,
    fallback_cooldown: f64,
) -> ResolvedRule {
    let empty = NotificationRule::default();
    let dispatch = rules.get(dispatch_key).unwrap_or(&empty);
    let legacy = rules.get(threshold_key).unwrap_or(&empty);

    let threshold = dispatch
        .threshold_absolute
        .or(legacy.threshold_absolute)
        .or(legacy.threshold_percent)
        .or(legacy.threshold)
        .or(dispatch.threshold);

    let channels = if dispatch.channels.is_empty() {
        clean_channels(&legacy.channels)
    } else {
        clean_channels(&dispatch.channels)
    };

    ResolvedRule {
        threshold: finite(threshold).unwrap_or(fallback_threshold),
        cooldown_minutes: positive(dispatch.cooldown_minutes.or(legacy.cooldown_minutes))
            .unwrap_or(fallback_cooldown),
        channels,
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn clean_channels(channels: &[String]) -> Vec<String> {
    channels
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}
