//! Threshold evaluators. Each one computes a signal, compares it against its
//! resolved rule and calls [`Notifier::notify`] only on a breach.

use crate::notifier::{NotificationPayload, Notifier, NotifierError, NotifyOutcome};
use crate::rules::{
    resolve_high_profit_rule, resolve_low_cex_volume_rule, resolve_low_gas_threshold,
    resolve_profit_rule, ResolvedRule, HIGH_PROFIT_RULE, LOW_CEX_VOLUME_RULE, LOW_GAS_RULE,
    PROFIT_RULE,
};
use fleet_core::{DiffSnapshot, GasReading};
use fleet_store::TradeRow;
use serde_json::json;
use tracing::debug;

/// Where a trade evaluation was triggered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationOrigin {
    /// Right after the trade was first stored.
    Store,
    /// Periodic sweep over recently updated trades.
    Sweep,
}

impl EvaluationOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationOrigin::Store => "store",
            EvaluationOrigin::Sweep => "sweep",
        }
    }
}

/// `None` when the condition did not hold.
pub type Evaluation = Result<Option<NotifyOutcome>, NotifierError>;

pub async fn evaluate_low_profit(
    notifier: &Notifier,
    trade: &TradeRow,
    origin: EvaluationOrigin,
) -> Evaluation {
    let rule = resolve_profit_rule(notifier.rules());
    let Some(profit) = trade.net_profit() else {
        return Ok(None);
    };
    debug!(rule = PROFIT_RULE, trade = trade.id, profit, threshold = rule.threshold, origin = origin.as_str(), "Evaluating trade");
    if profit >= rule.threshold {
        return Ok(None);
    }

    let pair = trade.pair.as_deref().unwrap_or("unknown");
    let title = if profit < -30.0 {
        format!("⚠️ Low profit trade: {pair}")
    } else {
        format!("Low profit trade: {pair}")
    };
    let payload = trade_payload(notifier, trade, &rule, profit, origin, title, "low-profit");
    notifier.notify(PROFIT_RULE, payload).await.map(Some)
}

pub async fn evaluate_high_profit(
    notifier: &Notifier,
    trade: &TradeRow,
    origin: EvaluationOrigin,
) -> Evaluation {
    let rule = resolve_high_profit_rule(notifier.rules());
    let Some(profit) = trade.net_profit() else {
        return Ok(None);
    };
    debug!(rule = HIGH_PROFIT_RULE, trade = trade.id, profit, threshold = rule.threshold, origin = origin.as_str(), "Evaluating trade");
    if profit < rule.threshold {
        return Ok(None);
    }

    let pair = trade.pair.as_deref().unwrap_or("unknown");
    let title = if profit > 30.0 {
        format!("💸 High profit trade: {pair}")
    } else {
        format!("High profit trade: {pair}")
    };
    let payload = trade_payload(notifier, trade, &rule, profit, origin, title, "high-profit");
    notifier.notify(HIGH_PROFIT_RULE, payload).await.map(Some)
}

fn trade_payload(
    notifier: &Notifier,
    trade: &TradeRow,
    rule: &ResolvedRule,
    profit: f64,
    origin: EvaluationOrigin,
    title: String,
    key_prefix: &str,
) -> NotificationPayload {
    let pair = trade.pair.as_deref().unwrap_or("unknown");
    let dex = trade.features().dex.unwrap_or_else(|| "N/A".to_string());
    let label = notifier.server_label();

    NotificationPayload::new(format!("Server: {label} | Profit: {profit:.2} | Dex: {dex}"))
        .with_title(title)
        .with_cooldown(rule.cooldown_minutes)
        .with_unique_key(format!("{key_prefix}-{}", trade.id))
        .with_channels(rule.channels.clone())
        .with_details(json!({
            "tradeId": trade.id,
            "pair": pair,
            "profit": profit,
            "server": label,
            "origin": origin.as_str(),
            "threshold": rule.threshold,
            "delta": profit - rule.threshold,
            "dex": dex,
        }))
}

/// One notification per contract below the `lowGas` threshold, keyed by contract.
pub async fn evaluate_low_gas(
    notifier: &Notifier,
    readings: &[GasReading],
) -> Result<Vec<NotifyOutcome>, NotifierError> {
    let threshold = resolve_low_gas_threshold(notifier.rules());
    let label = notifier.server_label();
    let mut outcomes = Vec::new();

    for reading in readings.iter().filter(|r| r.gas < threshold) {
        let payload = NotificationPayload::new(format!(
            "Gas for {} is {}",
            reading.contract, reading.gas
        ))
        .with_title(format!("Low Gas: {label}"))
        .with_unique_key(reading.contract.clone())
        .with_details(json!({
            "server": label,
            "contract": reading.contract,
            "gas": reading.gas,
            "threshold": threshold,
        }));
        outcomes.push(notifier.notify(LOW_GAS_RULE, payload).await?);
    }
    Ok(outcomes)
}

pub async fn evaluate_low_cex_volume(notifier: &Notifier, snapshot: &DiffSnapshot) -> Evaluation {
    let rule = resolve_low_cex_volume_rule(notifier.rules());
    let Some(volume) = snapshot.cex_vol.filter(|v| v.is_finite()) else {
        return Ok(None);
    };
    if volume >= rule.threshold {
        return Ok(None);
    }

    let token = snapshot.token_name().unwrap_or(&snapshot.cur_id);
    let label = notifier.server_label();
    let delta = volume - rule.threshold;
    let message = [
        format!("Server: {label}"),
        format!("Token: {token}"),
        format!("CEX Volume: {volume:.2}"),
        format!("Threshold: {:.2}", rule.threshold),
        format!("Delta: {delta:.2}"),
    ]
    .join("\n");

    let payload = NotificationPayload::new(message)
        .with_title(format!("Low CEX Volume - {token}"))
        .with_cooldown(rule.cooldown_minutes)
        .with_unique_key(snapshot.cur_id.clone())
        .with_channels(rule.channels.clone())
        .with_details(json!({
            "serverId": notifier.server_id(),
            "server": label,
            "token": token,
            "curId": snapshot.cur_id,
            "timestamp": snapshot.ts,
            "volume": volume,
            "threshold": rule.threshold,
            "delta": delta,
        }));
    notifier.notify(LOW_CEX_VOLUME_RULE, payload).await.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;
    use crate::notifier::tests::{notifier_with, FakeChannel};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn trade(id: i64, src_price: f64, dst_price: f64) -> TradeRow {
        TradeRow {
            id,
            pair: Some("WETH/USDT".to_string()),
            executed_src_price: Some(src_price),
            executed_dst_price: Some(dst_price),
            executed_qty_src: Some(1.0),
            executed_qty_dst: Some(1.0),
            props: Some(r#"{"Dex":"SELL"}"#.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_low_profit_fires_below_threshold() {
        let telegram = FakeChannel::healthy(ChannelKind::Telegram);
        let notifier = notifier_with(vec![telegram.clone()], Arc::new(AtomicI64::new(0))).await;

        let losing = trade(1, 1010.0, 1000.0);
        let outcome = evaluate_low_profit(&notifier, &losing, EvaluationOrigin::Store)
            .await
            .unwrap();
        assert!(outcome.unwrap().is_dispatched());

        let log = notifier.store().recent_notification_log(1).await.unwrap();
        assert_eq!(log[0].title.as_deref(), Some("Low profit trade: WETH/USDT"));
        assert_eq!(
            log[0].message.as_deref(),
            Some("Server: BNB | Profit: -10.20 | Dex: SELL")
        );

        let winning = trade(2, 1000.0, 1010.0);
        assert_eq!(
            evaluate_low_profit(&notifier, &winning, EvaluationOrigin::Sweep)
                .await
                .unwrap(),
            None
        );
        assert_eq!(telegram.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sweep_does_not_refire_same_trade() {
        let telegram = FakeChannel::healthy(ChannelKind::Telegram);
        let notifier = notifier_with(vec![telegram.clone()], Arc::new(AtomicI64::new(0))).await;
        let losing = trade(7, 1100.0, 1000.0);

        evaluate_low_profit(&notifier, &losing, EvaluationOrigin::Store).await.unwrap();
        let again = evaluate_low_profit(&notifier, &losing, EvaluationOrigin::Sweep)
            .await
            .unwrap();
        assert!(!again.unwrap().is_dispatched());
        assert_eq!(telegram.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_high_profit_title_marker() {
        let telegram = FakeChannel::healthy(ChannelKind::Telegram);
        let notifier = notifier_with(vec![telegram], Arc::new(AtomicI64::new(0))).await;

        let big = trade(3, 1000.0, 1200.0);
        evaluate_high_profit(&notifier, &big, EvaluationOrigin::Store).await.unwrap();
        let log = notifier.store().recent_notification_log(1).await.unwrap();
        assert_eq!(log[0].title.as_deref(), Some("💸 High profit trade: WETH/USDT"));
        assert_eq!(log[0].rule, "high-profit-trade");
    }

    #[tokio::test]
    async fn test_trade_without_prices_is_ignored() {
        let notifier = notifier_with(vec![], Arc::new(AtomicI64::new(0))).await;
        let incomplete = TradeRow {
            id: 4,
            ..Default::default()
        };
        assert_eq!(
            evaluate_low_profit(&notifier, &incomplete, EvaluationOrigin::Sweep)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_low_gas_dedups_per_contract() {
        let telegram = FakeChannel::healthy(ChannelKind::Telegram);
        let notifier = notifier_with(vec![telegram.clone()], Arc::new(AtomicI64::new(0))).await;
        let readings = vec![
            GasReading {
                contract: "0xaaa".to_string(),
                gas: 1.5,
                is_low: true,
            },
            GasReading {
                contract: "0xbbb".to_string(),
                gas: 0.3,
                is_low: true,
            },
            GasReading {
                contract: "0xccc".to_string(),
                gas: 4.0,
                is_low: false,
            },
        ];

        let first = evaluate_low_gas(&notifier, &readings).await.unwrap();
        assert_eq!(first.len(), 2);
        let second = evaluate_low_gas(&notifier, &readings).await.unwrap();
        assert!(second.iter().all(|o| !o.is_dispatched()));
        assert_eq!(telegram.sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_low_cex_volume_message() {
        let telegram = FakeChannel::healthy(ChannelKind::Telegram);
        let notifier = notifier_with(vec![telegram], Arc::new(AtomicI64::new(0))).await;

        let mut snapshot = DiffSnapshot::new("BSC_CAKE_USDT", 1_700_000_000_000);
        snapshot.cex_vol = Some(4.5);
        let outcome = evaluate_low_cex_volume(&notifier, &snapshot).await.unwrap();
        assert!(outcome.unwrap().is_dispatched());

        let log = notifier.store().recent_notification_log(1).await.unwrap();
        assert_eq!(log[0].title.as_deref(), Some("Low CEX Volume - CAKE"));
        assert_eq!(
            log[0].message.as_deref(),
            Some("Server: BNB\nToken: CAKE\nCEX Volume: 4.50\nThreshold: 10.00\nDelta: -5.50")
        );

        snapshot.cex_vol = Some(12.0);
        assert_eq!(evaluate_low_cex_volume(&notifier, &snapshot).await.unwrap(), None);
    }
}
