//! Bootstrap-then-incremental sync across the configured servers.

use crate::error::SyncError;
use crate::registry::{Registry, ServerContext};
use crate::report::{CycleReport, FetchKind, FetchOutcome, FetchReport, ServerReport};
use fleet_alerts::rules::POLL_FAILED_RULE;
use fleet_alerts::{evaluate_high_profit, evaluate_low_gas, evaluate_low_profit, EvaluationOrigin, NotificationPayload};
use fleet_core::{
    parse_status, BalanceSnapshot, CompletedTrade, ContractTx, DiffSnapshot, NativeAsset,
    ServerConfig,
};
use fleet_feeds::{BotServerApi, ExplorerApi, NativePriceCache};
use fleet_store::TradeRow;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

pub struct Orchestrator {
    pub(crate) servers: Vec<ServerConfig>,
    pub(crate) registry: Registry,
    pub(crate) upstream: Arc<dyn BotServerApi>,
    explorer: Arc<dyn ExplorerApi>,
    prices: Arc<NativePriceCache>,
    /// Servers whose full history was synced by this process.
    bootstrapped: Mutex<HashSet<String>>,
}

impl Orchestrator {
    pub fn new(
        servers: Vec<ServerConfig>,
        registry: Registry,
        upstream: Arc<dyn BotServerApi>,
        explorer: Arc<dyn ExplorerApi>,
        prices: Arc<NativePriceCache>,
    ) -> Self {
        Self {
            servers,
            registry,
            upstream,
            explorer,
            prices,
            bootstrapped: Mutex::new(HashSet::new()),
        }
    }

    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_bootstrapped(&self, server_id: &str) -> bool {
        self.bootstrapped
            .lock()
            .map(|set| set.contains(server_id))
            .unwrap_or(false)
    }

    fn mark_bootstrapped(&self, server_id: &str) {
        if let Ok(mut set) = self.bootstrapped.lock() {
            set.insert(server_id.to_string());
        }
    }

    /// Sync every server, one after another, then run the evaluation sweep.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport {
            started_at: self.registry.now(),
            ..Default::default()
        };

        for server in &self.servers {
            report.servers.push(self.sync_server(server).await);
        }
        report.sweep = self.run_sweep().await;
        report.finish(self.registry.now());

        info!(
            servers = report.servers.len(),
            failed = report.failed_fetches,
            malformed = report.malformed_payloads,
            dispatched = report.sweep.dispatched,
            "Sync cycle complete"
        );
        report
    }

    /// Bootstrap if needed, then the five independent fetches.
    pub async fn sync_server(&self, server: &ServerConfig) -> ServerReport {
        let mut report = ServerReport::new(&server.id);

        let ctx = match self.registry.context(server).await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(server = %server.id, error = %e, "Failed to open server store");
                let error = SyncError::from(e);
                report.bootstrap = Some(FetchOutcome::Failed {
                    class: error.failure_class(),
                    error: error.to_string(),
                });
                return report;
            }
        };

        if !self.is_bootstrapped(&server.id) {
            let outcome = match self.sync_full_history(&ctx).await {
                Ok(outcome) => {
                    self.mark_bootstrapped(&server.id);
                    outcome
                }
                Err(e) => {
                    warn!(server = %server.id, fetch = "bootstrap", error = %e, "Full history sync failed; retrying next cycle");
                    failed(&e)
                }
            };
            report.bootstrap = Some(outcome);
        }

        let (status, balances, trades, diffs, contracts) = tokio::join!(
            self.sync_status(&ctx),
            self.sync_balances(&ctx),
            self.sync_trades(&ctx),
            self.sync_diff_data(&ctx),
            self.sync_contracts(&ctx),
        );

        for (fetch, result) in [
            (FetchKind::Status, status),
            (FetchKind::Balances, balances),
            (FetchKind::Trades, trades),
            (FetchKind::DiffData, diffs),
            (FetchKind::Contracts, contracts),
        ] {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.report_poll_failure(&ctx, fetch, &e).await;
                    failed(&e)
                }
            };
            report.fetches.push(FetchReport { fetch, outcome });
        }
        report
    }

    async fn sync_full_history(&self, ctx: &ServerContext) -> Result<FetchOutcome, SyncError> {
        let payload = self.upstream.fetch_completed_all(&ctx.server).await?;
        self.store_trades(ctx, &payload, FetchKind::Bootstrap).await
    }

    async fn sync_trades(&self, ctx: &ServerContext) -> Result<FetchOutcome, SyncError> {
        let payload = self.upstream.fetch_completed(&ctx.server).await?;
        self.store_trades(ctx, &payload, FetchKind::Trades).await
    }

    /// Insert-or-ignore, then evaluate only the trades that were new.
    async fn store_trades(
        &self,
        ctx: &ServerContext,
        payload: &Value,
        fetch: FetchKind,
    ) -> Result<FetchOutcome, SyncError> {
        let Some(trades) = CompletedTrade::parse_list(payload) else {
            return Ok(malformed(&ctx.server, fetch));
        };

        let inserted = ctx.store.insert_completed_trades(&trades).await?;
        info!(server = %ctx.server.id, fetch = fetch.as_str(), stored = inserted.len(), received = trades.len(), "Stored trades");

        let mut pending: HashSet<i64> = inserted.iter().copied().collect();
        for trade in &trades {
            if pending.remove(&trade.id) {
                self.evaluate_trade(ctx, &TradeRow::from(trade), EvaluationOrigin::Store)
                    .await;
            }
        }
        Ok(FetchOutcome::Stored {
            count: inserted.len() as u64,
        })
    }

    /// Run both trade evaluators. Returns how many dispatched.
    pub(crate) async fn evaluate_trade(
        &self,
        ctx: &ServerContext,
        trade: &TradeRow,
        origin: EvaluationOrigin,
    ) -> usize {
        let mut dispatched = 0;
        for result in [
            evaluate_low_profit(&ctx.notifier, trade, origin).await,
            evaluate_high_profit(&ctx.notifier, trade, origin).await,
        ] {
            match result {
                Ok(Some(outcome)) if outcome.is_dispatched() => dispatched += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(server = %ctx.server.id, trade = trade.id, error = %e, "Trade evaluation failed")
                }
            }
        }
        dispatched
    }

    async fn sync_status(&self, ctx: &ServerContext) -> Result<FetchOutcome, SyncError> {
        let text = self.upstream.fetch_status(&ctx.server).await?;
        let status = parse_status(&text);
        let now = self.registry.now();

        let quotes = ctx.store.insert_token_quotes(&status.quotes, now).await?;
        let readings: Vec<_> = status.gas_readings().cloned().collect();
        let gas = ctx.store.insert_gas_readings(&readings, now).await?;
        debug!(server = %ctx.server.id, quotes, gas, "Stored status");

        if let Err(e) = evaluate_low_gas(&ctx.notifier, &readings).await {
            warn!(server = %ctx.server.id, error = %e, "Low gas evaluation failed");
        }
        Ok(FetchOutcome::Stored {
            count: (quotes + gas) as u64,
        })
    }

    async fn sync_balances(&self, ctx: &ServerContext) -> Result<FetchOutcome, SyncError> {
        let payload = self.upstream.fetch_balances(&ctx.server).await?;
        let Some(snapshot) = BalanceSnapshot::from_value(&payload) else {
            return Ok(malformed(&ctx.server, FetchKind::Balances));
        };
        ctx.store
            .insert_balance_snapshot(&snapshot, self.registry.now())
            .await?;
        debug!(server = %ctx.server.id, total_usdt = ?snapshot.total_usdt, "Stored balance snapshot");
        Ok(FetchOutcome::Stored { count: 1 })
    }

    async fn sync_diff_data(&self, ctx: &ServerContext) -> Result<FetchOutcome, SyncError> {
        let payload = self.upstream.fetch_diff_data(&ctx.server).await?;
        let Some(rows) = DiffSnapshot::parse_list(&payload) else {
            return Ok(malformed(&ctx.server, FetchKind::DiffData));
        };
        let merged = ctx.store.merge_diff_snapshots(&rows).await?;
        debug!(server = %ctx.server.id, merged, "Merged diff snapshots");
        Ok(FetchOutcome::Stored {
            count: merged as u64,
        })
    }

    async fn sync_contracts(&self, ctx: &ServerContext) -> Result<FetchOutcome, SyncError> {
        let has_contract = ctx
            .server
            .contract_address
            .as_deref()
            .is_some_and(|a| !a.trim().is_empty());
        if !has_contract {
            return Ok(FetchOutcome::Skipped);
        }

        let raw = self.explorer.fetch_transactions(&ctx.server).await?;
        if raw.is_empty() {
            return Ok(FetchOutcome::Stored { count: 0 });
        }

        let asset = NativeAsset::for_explorer_site(ctx.server.explorer_site.as_deref());
        let prices = self.prices.current().await.only(asset);
        let txs: Vec<_> = raw
            .iter()
            .filter_map(|v| ContractTx::from_explorer_value(v, prices))
            .collect();
        let stored = ctx
            .store
            .insert_contract_transactions(&ctx.server.id, &txs)
            .await?;
        Ok(FetchOutcome::Stored { count: stored })
    }

    /// `pollFailed`, keyed by fetch and failure class so distinct kinds of
    /// failure cool down independently.
    async fn report_poll_failure(&self, ctx: &ServerContext, fetch: FetchKind, error: &SyncError) {
        let class = error.failure_class();
        let label = ctx.server.display_name();
        warn!(server = %ctx.server.id, fetch = fetch.as_str(), class = %class, error = %error, "Fetch failed");

        let payload = NotificationPayload::new(format!(
            "Failed to fetch {} ({})",
            fetch.description(),
            error
        ))
        .with_title(format!("Poll Failed: {label}"))
        .with_unique_key(format!("{}-{}", fetch.as_str(), class))
        .with_details(json!({
            "server": label,
            "fetch": fetch.as_str(),
            "error": error.to_string(),
            "type": class,
        }));

        if let Err(e) = ctx.notifier.notify(POLL_FAILED_RULE, payload).await {
            warn!(server = %ctx.server.id, error = %e, "Failed to dispatch pollFailed");
        }
    }
}

fn failed(error: &SyncError) -> FetchOutcome {
    FetchOutcome::Failed {
        class: error.failure_class(),
        error: error.to_string(),
    }
}

fn malformed(server: &ServerConfig, fetch: FetchKind) -> FetchOutcome {
    warn!(server = %server.id, fetch = fetch.as_str(), "Upstream payload has unexpected shape; ignored");
    FetchOutcome::Malformed
}
