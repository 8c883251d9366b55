//! Evaluation sweep over recently stored data.

use crate::orchestrator::Orchestrator;
use crate::registry::ServerContext;
use crate::report::SweepReport;
use crate::SyncError;
use fleet_alerts::{evaluate_low_cex_volume, EvaluationOrigin};
use tracing::{debug, warn};

/// Trades updated within this window are re-evaluated by the sweep.
pub const SWEEP_TRADE_WINDOW_MS: i64 = 2 * 60 * 1000;

impl Orchestrator {
    /// Walk every server's recent trades and latest diff rows. Dedup keys
    /// keep an unchanged condition from firing again on each sweep.
    pub async fn run_sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for server in &self.servers {
            let ctx = match self.registry.context(server).await {
                Ok(ctx) => ctx,
                Err(e) => {
                    warn!(server = %server.id, error = %e, "Skipping sweep; store unavailable");
                    continue;
                }
            };
            if let Err(e) = self.sweep_server(&ctx, &mut report).await {
                warn!(server = %server.id, error = %e, "Evaluation sweep failed");
            }
        }
        report
    }

    async fn sweep_server(&self, ctx: &ServerContext, report: &mut SweepReport) -> Result<(), SyncError> {
        let since = self.registry.now() - SWEEP_TRADE_WINDOW_MS;
        let trades = ctx.store.trades_updated_since(since).await?;
        for trade in &trades {
            report.dispatched += self.evaluate_trade(ctx, trade, EvaluationOrigin::Sweep).await;
        }
        report.trades_evaluated += trades.len();

        let latest = ctx.store.latest_diff_per_cur().await?;
        for snapshot in &latest {
            match evaluate_low_cex_volume(&ctx.notifier, snapshot).await {
                Ok(Some(outcome)) if outcome.is_dispatched() => report.dispatched += 1,
                Ok(_) => {}
                Err(e) => warn!(server = %ctx.server.id, cur_id = %snapshot.cur_id, error = %e, "Low CEX volume evaluation failed"),
            }
        }
        report.snapshots_evaluated += latest.len();

        debug!(server = %ctx.server.id, trades = trades.len(), snapshots = latest.len(), "Sweep evaluated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{fixture, FakeUpstream, Fixture, NOW};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_sweep_alerts_latest_low_volume_once() {
        let upstream = FakeUpstream {
            diff_data: json!([
                { "curId": "BSC_CAKE_USDT", "ts": NOW - 60_000, "cexVol": 50.0 },
                { "curId": "BSC_CAKE_USDT", "ts": NOW, "cexVol": 3.0 },
                { "curId": "BSC_LINK_USDT", "ts": NOW, "cexVol": 80.0 },
            ]),
            ..Default::default()
        };
        let Fixture { orchestrator, channel, .. } = fixture(upstream).await;

        let first = orchestrator.run_cycle().await;
        assert_eq!(first.sweep.snapshots_evaluated, 2);
        assert_eq!(first.sweep.dispatched, 1);

        let second = orchestrator.run_cycle().await;
        assert_eq!(second.sweep.dispatched, 0);
        assert_eq!(channel.titles(), vec!["Low CEX Volume - CAKE".to_string()]);
    }

    #[tokio::test]
    async fn test_sweep_only_reads_recent_trades() {
        let upstream = FakeUpstream {
            completed_all: json!([
                { "id": 1, "lastUpdateTime": NOW - 30_000, "executedSrcPrice": 1.0, "executedDstPrice": 1.0, "executedQtySrc": 1.0, "executedQtyDst": 1.0 },
                { "id": 2, "lastUpdateTime": NOW - 600_000, "executedSrcPrice": 1.0, "executedDstPrice": 1.0, "executedQtySrc": 1.0, "executedQtyDst": 1.0 },
            ]),
            ..Default::default()
        };
        let Fixture { orchestrator, .. } = fixture(upstream).await;

        let report = orchestrator.run_cycle().await;
        assert_eq!(report.sweep.trades_evaluated, 1);
    }
}
