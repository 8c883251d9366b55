//! Scheduled digests: hourly and daily per server, balance update across
//! all servers.
//!
//! Digests are keyed by the period they cover, so a digest job that runs
//! twice in one period sends once while consecutive periods never suppress
//! each other.

use crate::orchestrator::Orchestrator;
use crate::registry::ServerContext;
use crate::SyncError;
use chrono::{DateTime, Utc};
use fleet_alerts::digest::{
    balance_update_message, daily_digest_message, hourly_digest_message, sum_fees, sum_net_profit,
    BalanceUpdate, DailyServerDigest, HourlyDigest, PeriodStats, BALANCE_UPDATE_PERIODS,
    TOP_PAIRS_LIMIT,
};
use fleet_alerts::rules::{digest_channels, BALANCE_UPDATE_RULE, DAILY_DIGEST_RULE, HOURLY_DIGEST_RULE};
use fleet_alerts::{NotificationPayload, NotifyOutcome};
use fleet_core::{parse_status, DexCexSplit};
use std::sync::Arc;
use tracing::{info, warn};

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

fn period_key(now_millis: i64, format: &str) -> String {
    DateTime::<Utc>::from_timestamp_millis(now_millis)
        .map(|at| at.format(format).to_string())
        .unwrap_or_else(|| now_millis.to_string())
}

impl Orchestrator {
    /// Send each server its hourly digest. Returns how many were dispatched.
    pub async fn run_hourly_digest(&self) -> usize {
        let mut dispatched = 0;
        for server in &self.servers {
            let result = match self.registry.context(server).await {
                Ok(ctx) => self.send_hourly_digest(&ctx).await,
                Err(e) => Err(SyncError::from(e)),
            };
            match result {
                Ok(outcome) if outcome.is_dispatched() => dispatched += 1,
                Ok(_) => {}
                Err(e) => warn!(server = %server.id, error = %e, "Hourly digest failed"),
            }
        }
        info!(dispatched, "Hourly digest run complete");
        dispatched
    }

    async fn send_hourly_digest(&self, ctx: &ServerContext) -> Result<NotifyOutcome, SyncError> {
        let now = self.registry.now();
        let status = match self.upstream.fetch_status(&ctx.server).await {
            Ok(text) => Some(parse_status(&text)),
            Err(e) => {
                warn!(server = %ctx.server.id, error = %e, "Status unavailable for hourly digest");
                None
            }
        };
        let trades = ctx.store.trades_updated_since(now - HOUR_MS).await?;
        let balance = ctx
            .store
            .latest_balance_raw()
            .await?
            .map(|raw| DexCexSplit::from_raw(&raw));

        let label = ctx.server.display_name();
        let message = hourly_digest_message(&HourlyDigest {
            server_label: label.to_string(),
            status,
            trades_last_hour: trades.len(),
            profit_last_hour: sum_net_profit(&trades),
            balance,
        });

        let payload = NotificationPayload::new(message)
            .with_title(format!("Hourly Digest: {label}"))
            .with_unique_key(period_key(now, "%Y-%m-%dT%H"))
            .with_channels(digest_channels(self.registry.rules(), HOURLY_DIGEST_RULE, &["slack"]));
        Ok(ctx.notifier.notify(HOURLY_DIGEST_RULE, payload).await?)
    }

    /// Send each server its daily digest through its own notifier.
    /// Returns how many were dispatched.
    pub async fn run_daily_digest(&self) -> usize {
        let mut dispatched = 0;
        for server in &self.servers {
            let result = match self.registry.context(server).await {
                Ok(ctx) => self.send_daily_digest(&ctx).await,
                Err(e) => Err(SyncError::from(e)),
            };
            match result {
                Ok(outcome) if outcome.is_dispatched() => dispatched += 1,
                Ok(_) => {}
                Err(e) => warn!(server = %server.id, error = %e, "Daily digest failed"),
            }
        }
        info!(dispatched, "Daily digest run complete");
        dispatched
    }

    async fn send_daily_digest(&self, ctx: &ServerContext) -> Result<NotifyOutcome, SyncError> {
        let now = self.registry.now();
        let section = daily_section(ctx, now - DAY_MS).await?;

        let payload = NotificationPayload::new(daily_digest_message(&section))
            .with_title(format!("Daily Digest: {}", ctx.server.display_name()))
            .with_unique_key(period_key(now, "%Y-%m-%d"))
            .with_channels(digest_channels(self.registry.rules(), DAILY_DIGEST_RULE, &[]));
        Ok(ctx.notifier.notify(DAILY_DIGEST_RULE, payload).await?)
    }

    /// Balances and 1h..24h profit for every server in one message.
    pub async fn run_balance_update(&self) -> Result<Option<NotifyOutcome>, SyncError> {
        let Some(first) = self.first_context().await? else {
            return Ok(None);
        };
        let now = self.registry.now();

        let mut updates = Vec::with_capacity(self.servers.len());
        for server in &self.servers {
            let update = match self.registry.context(server).await {
                Ok(ctx) => balance_section(&ctx, now).await,
                Err(e) => Err(SyncError::from(e)),
            };
            match update {
                Ok(update) => updates.push(update),
                Err(e) => warn!(server = %server.id, error = %e, "Failed to gather balance update data"),
            }
        }

        let payload = NotificationPayload::new(balance_update_message(&updates))
            .with_title("Balance Update for All Servers")
            .with_unique_key(period_key(now, "%Y-%m-%dT%H"))
            .with_channels(digest_channels(self.registry.rules(), BALANCE_UPDATE_RULE, &["slack"]));
        Ok(Some(first.notifier.notify(BALANCE_UPDATE_RULE, payload).await?))
    }

    async fn first_context(&self) -> Result<Option<Arc<ServerContext>>, SyncError> {
        match self.servers.first() {
            Some(server) => Ok(Some(self.registry.context(server).await?)),
            None => Ok(None),
        }
    }
}

async fn daily_section(ctx: &ServerContext, since: i64) -> Result<DailyServerDigest, SyncError> {
    let trades = ctx.store.trades_updated_since(since).await?;
    Ok(DailyServerDigest {
        server_label: ctx.server.display_name().to_string(),
        profit_24h: sum_net_profit(&trades),
        tx_stats: ctx.store.contract_tx_stats_since(since).await?,
        top_pairs: ctx.store.top_pairs_since(since, TOP_PAIRS_LIMIT).await?,
        fee_spend: sum_fees(&trades),
        low_gas_occurrences: ctx.store.low_gas_count_since(since).await?,
    })
}

async fn balance_section(ctx: &ServerContext, now: i64) -> Result<BalanceUpdate, SyncError> {
    let balance = ctx
        .store
        .latest_balance_raw()
        .await?
        .map(|raw| DexCexSplit::from_raw(&raw));

    let mut periods = Vec::with_capacity(BALANCE_UPDATE_PERIODS.len());
    for hours in BALANCE_UPDATE_PERIODS {
        let trades = ctx.store.trades_updated_since(now - hours * HOUR_MS).await?;
        periods.push(PeriodStats {
            hours,
            profit: sum_net_profit(&trades),
            trades: trades.len(),
        });
    }

    Ok(BalanceUpdate {
        server_label: ctx.server.display_name().to_string(),
        balance,
        periods,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, fixture_with_servers, FakeUpstream, Fixture, NOW};
    use fleet_core::ServerConfig;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_period_key() {
        assert_eq!(period_key(NOW, "%Y-%m-%dT%H"), "2023-11-14T22");
        assert_eq!(period_key(NOW, "%Y-%m-%d"), "2023-11-14");
    }

    #[tokio::test]
    async fn test_hourly_digest_once_per_hour() {
        let upstream = FakeUpstream {
            completed_all: json!([{
                "id": 9,
                "lastUpdateTime": NOW - 10_000,
                "executedSrcPrice": 100.0,
                "executedDstPrice": 110.0,
                "executedQtySrc": 1.0,
                "executedQtyDst": 1.0,
            }]),
            ..Default::default()
        };
        let Fixture { orchestrator, channel, clock, .. } = fixture(upstream).await;
        orchestrator.run_cycle().await;

        assert_eq!(orchestrator.run_hourly_digest().await, 1);
        assert_eq!(orchestrator.run_hourly_digest().await, 0);
        clock.fetch_add(HOUR_MS, Ordering::SeqCst);
        assert_eq!(orchestrator.run_hourly_digest().await, 1);

        let digests: Vec<_> = channel
            .messages()
            .into_iter()
            .filter(|m| m.title == "Hourly Digest: BNB")
            .collect();
        assert_eq!(digests.len(), 2);
        assert!(digests[0].message.contains("💼 Trades: 1 | 💰 Profit: 9.98"));
        assert!(digests[0].message.contains("🏦 BinanceF Total USDT: 100.00"));
    }

    #[tokio::test]
    async fn test_daily_digest_per_server() {
        let servers = vec![
            ServerConfig::new("bnb", "BNB", "http://bnb.local:3001"),
            ServerConfig::new("base", "BASE", "http://base.local:3001"),
        ];
        let Fixture { orchestrator, channel, clock, .. } =
            fixture_with_servers(FakeUpstream::default(), servers).await;

        assert_eq!(orchestrator.run_daily_digest().await, 2);
        assert_eq!(orchestrator.run_daily_digest().await, 0);

        let titles = channel.titles();
        assert_eq!(
            titles,
            vec!["Daily Digest: BNB".to_string(), "Daily Digest: BASE".to_string()]
        );
        assert!(channel.messages()[1].message.starts_with("Daily digest for BASE:\n"));
        assert!(channel.messages()[1].message.contains("Success Rate: 100.00%"));

        // Each server keeps its own cooldown state.
        for server in orchestrator.servers() {
            let ctx = orchestrator.registry().context(server).await.unwrap();
            let key = format!("{}:dailyDigest:2023-11-14", server.id);
            assert_eq!(ctx.store.notification_last_sent(&key).await.unwrap(), Some(NOW));
        }

        clock.fetch_add(DAY_MS, Ordering::SeqCst);
        assert_eq!(orchestrator.run_daily_digest().await, 2);
    }

    #[tokio::test]
    async fn test_balance_update_without_servers() {
        let Fixture { orchestrator, .. } =
            fixture_with_servers(FakeUpstream::default(), vec![]).await;
        assert_eq!(orchestrator.run_balance_update().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_balance_update_periods() {
        let Fixture { orchestrator, channel, .. } = fixture(FakeUpstream::default()).await;
        orchestrator.run_cycle().await;

        orchestrator.run_balance_update().await.unwrap();
        let sent = channel.messages();
        let update = sent
            .iter()
            .find(|m| m.title == "Balance Update for All Servers")
            .unwrap();
        assert!(update.message.starts_with("📊 *SERVER: BNB*\nTotal (USDT)    : 100.00\n"));
        assert_eq!(update.message.matches("Last ").count(), 5);
    }
}
