//! Timed loops driving the orchestrator: poll cycles, hourly digests and
//! balance updates, and the daily summary.

use crate::health::HealthState;
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use clap::ValueEnum;
use fleet_engine::Orchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 120;
/// Hour (UTC) at which the daily summary goes out.
pub const DAILY_DIGEST_HOUR_UTC: u32 = 8;

/// Where the polling work runs relative to the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeploymentMode {
    /// Loops share the main runtime.
    Inline,
    /// Loops run on a dedicated thread with their own runtime.
    Worker,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::Inline => "inline",
            DeploymentMode::Worker => "worker",
        }
    }
}

/// Time left until the next top of the hour.
pub fn until_next_hour(now: DateTime<Utc>) -> Duration {
    let elapsed = ChronoDuration::minutes(now.minute() as i64)
        + ChronoDuration::seconds(now.second() as i64)
        + ChronoDuration::nanoseconds(now.nanosecond() as i64);
    (ChronoDuration::hours(1) - elapsed)
        .to_std()
        .unwrap_or_default()
}

/// Time left until the next `hour:00` UTC, today or tomorrow.
pub fn until_next_daily(now: DateTime<Utc>, hour: u32) -> Duration {
    let Some(today) = now.date_naive().and_hms_opt(hour, 0, 0) else {
        return Duration::from_secs(24 * 60 * 60);
    };
    let mut next = today.and_utc();
    if next <= now {
        next += ChronoDuration::days(1);
    }
    (next - now).to_std().unwrap_or_default()
}

/// Run one cycle every `interval`, starting immediately.
pub async fn run_poll_loop(
    orchestrator: Arc<Orchestrator>,
    health: Arc<HealthState>,
    interval: Duration,
) {
    info!(interval_secs = interval.as_secs(), "Starting poll loop");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while health.is_running() {
        ticker.tick().await;
        let report = orchestrator.run_cycle().await;
        if report.failed_fetches > 0 {
            warn!(
                failed = report.failed_fetches,
                malformed = report.malformed_payloads,
                "Cycle finished with failures"
            );
        }
        health.record_cycle(report);
    }
}

pub async fn run_hourly_loop(orchestrator: Arc<Orchestrator>, health: Arc<HealthState>) {
    while health.is_running() {
        tokio::time::sleep(until_next_hour(Utc::now())).await;

        let sent = orchestrator.run_hourly_digest().await;
        info!(servers = sent, "Hourly digest done");
        if let Err(e) = orchestrator.run_balance_update().await {
            error!("Balance update failed: {}", e);
        }
        health.record_digest();
    }
}

pub async fn run_daily_loop(orchestrator: Arc<Orchestrator>, health: Arc<HealthState>) {
    while health.is_running() {
        tokio::time::sleep(until_next_daily(Utc::now(), DAILY_DIGEST_HOUR_UTC)).await;

        let sent = orchestrator.run_daily_digest().await;
        info!(servers = sent, "📊 Daily digest done");
        health.record_digest();
    }
}

/// All three loops on the current runtime.
pub async fn run_schedule(
    orchestrator: Arc<Orchestrator>,
    health: Arc<HealthState>,
    interval: Duration,
) {
    tokio::join!(
        run_poll_loop(orchestrator.clone(), health.clone(), interval),
        run_hourly_loop(orchestrator.clone(), health.clone()),
        run_daily_loop(orchestrator, health),
    );
}

/// Start the schedule on a dedicated OS thread. `build` runs inside the
/// worker's runtime so anything it spawns lives there.
pub fn spawn_worker<F>(
    build: F,
    health: Arc<HealthState>,
    interval: Duration,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    F: FnOnce() -> Orchestrator + Send + 'static,
{
    std::thread::Builder::new()
        .name("fleet-worker".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to start worker runtime: {}", e);
                    return;
                }
            };
            runtime.block_on(async move {
                info!("Worker runtime started");
                let orchestrator = Arc::new(build());
                run_schedule(orchestrator, health, interval).await;
            });
        })
}
