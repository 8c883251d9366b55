//! Fleet Monitor - headless poller
//!
//! Syncs every configured bot server into its own store, evaluates
//! notification rules and sends periodic digests.

mod health;
mod scheduler;

use clap::Parser;
use fleet_alerts::build_channels;
use fleet_core::MonitorConfig;
use fleet_engine::{Orchestrator, Registry, StoreLocation};
use fleet_feeds::{
    BinanceTickerClient, EtherscanClient, ExplorerSettings, HttpBotServerClient,
    NativePriceCache, ThrottledClient, PRICE_REFRESH_INTERVAL,
};
use health::HealthState;
use scheduler::{DeploymentMode, DEFAULT_POLL_INTERVAL_SECS};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Fleet Monitor CLI
#[derive(Parser, Debug)]
#[command(name = "fleet-monitor")]
#[command(about = "Polls a fleet of trading bot servers and sends alerts", long_about = None)]
struct Args {
    /// Server and notification configuration file
    #[arg(short, long, default_value = "servers.json")]
    config: PathBuf,

    /// Directory holding one database per server
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Run the scheduler inline or on a dedicated worker thread
    #[arg(short, long, value_enum, default_value_t = DeploymentMode::Inline)]
    mode: DeploymentMode,

    /// Log level when RUST_LOG is unset: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Port for the health endpoint
    #[arg(long, default_value_t = 3000)]
    http_port: u16,

    /// Seconds between sync cycles
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    poll_interval_secs: u64,

    /// Run a single cycle, print its report and exit
    #[arg(long, default_value_t = false)]
    once: bool,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Wire clients, channels and stores into an orchestrator. Must run inside
/// the runtime that will drive it: the throttled client spawns its queue.
fn build_orchestrator(config: &MonitorConfig, data_dir: &Path) -> Orchestrator {
    let client = reqwest::Client::new();

    let channels = build_channels(&config.notifications);
    info!(
        channels = ?channels.iter().map(|c| c.kind().as_str()).collect::<Vec<_>>(),
        "Notification channels configured"
    );

    let registry = Registry::new(
        StoreLocation::Directory(data_dir.to_path_buf()),
        channels,
        config.notification_rules.clone(),
    );
    let explorer = EtherscanClient::new(
        ThrottledClient::http(client.clone()),
        ExplorerSettings::from_env(),
    );
    let prices = NativePriceCache::new(
        Arc::new(BinanceTickerClient::new(client.clone())),
        PRICE_REFRESH_INTERVAL,
    );

    Orchestrator::new(
        config.servers.clone(),
        registry,
        Arc::new(HttpBotServerClient::new(client)),
        Arc::new(explorer),
        Arc::new(prices),
    )
}

fn load_config(path: &Path) -> Option<MonitorConfig> {
    match MonitorConfig::load_or_init(path) {
        Ok(config) => Some(config),
        Err(e) => {
            error!("{}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_logging(&args.log_level);

    info!("🚀 Fleet Monitor starting...");
    info!("  Config: {}", args.config.display());
    info!("  Data dir: {}", args.data_dir.display());
    info!("  Mode: {}", args.mode.as_str());
    info!("  Poll interval: {}s", args.poll_interval_secs);

    let Some(config) = load_config(&args.config) else {
        std::process::exit(1);
    };
    if config.servers.is_empty() {
        warn!("No servers configured, cycles will be empty");
    }
    if let Err(e) = std::fs::create_dir_all(&args.data_dir) {
        error!("Failed to create data dir {}: {}", args.data_dir.display(), e);
        std::process::exit(1);
    }

    if args.once {
        let orchestrator = build_orchestrator(&config, &args.data_dir);
        let report = orchestrator.run_cycle().await;
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("Failed to render cycle report: {}", e),
        }
        return;
    }

    let interval = Duration::from_secs(args.poll_interval_secs.max(1));
    let health = Arc::new(HealthState::new(args.mode.as_str()));

    if let Err(e) = health::start_health_server(health.clone(), args.http_port).await {
        error!("Failed to start health endpoint: {}", e);
        std::process::exit(1);
    }

    let schedule_handle = match args.mode {
        DeploymentMode::Inline => {
            let orchestrator = Arc::new(build_orchestrator(&config, &args.data_dir));
            let schedule_health = health.clone();
            Some(tokio::spawn(async move {
                scheduler::run_schedule(orchestrator, schedule_health, interval).await;
            }))
        }
        DeploymentMode::Worker => {
            let data_dir = args.data_dir.clone();
            let build = move || build_orchestrator(&config, &data_dir);
            if let Err(e) = scheduler::spawn_worker(build, health.clone(), interval) {
                error!("Failed to spawn worker thread: {}", e);
                std::process::exit(1);
            }
            None
        }
    };

    info!("Press Ctrl+C to stop...");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for Ctrl+C");

    warn!("Shutdown signal received");
    health.stop();

    if let Some(handle) = schedule_handle {
        handle.abort();
    }

    let summary = health.snapshot();
    info!("📈 Final Stats:");
    info!("  Cycles: {}", summary.cycles);
    info!("  Digests: {}", summary.digests);

    info!("👋 Fleet Monitor stopped");
}
