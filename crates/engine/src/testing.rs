//! Fakes shared by the engine tests.

use crate::orchestrator::Orchestrator;
use crate::registry::{Registry, StoreLocation};
use async_trait::async_trait;
use fleet_alerts::{Channel, ChannelError, ChannelKind, OutboundMessage};
use fleet_core::{MonitorConfig, NativeAsset, ServerConfig};
use fleet_feeds::{BotServerApi, ExplorerApi, FeedError, NativePriceCache, PriceApi, PRICE_REFRESH_INTERVAL};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const NOW: i64 = 1_700_000_000_000;

pub struct FakeUpstream {
    pub status: String,
    pub balances: Value,
    pub completed: Value,
    pub completed_all: Value,
    pub diff_data: Value,
    pub balances_error: Option<fn() -> FeedError>,
    pub diff_error: Option<fn() -> FeedError>,
    /// Servers whose every fetch fails with a connection error.
    pub unreachable: Vec<&'static str>,
    /// Number of leading `completedall` calls that fail.
    pub completed_all_failures: AtomicUsize,
    pub completed_calls: AtomicUsize,
    pub completed_all_calls: AtomicUsize,
}

impl Default for FakeUpstream {
    fn default() -> Self {
        Self {
            status: String::new(),
            balances: json!({ "BinanceF": { "usdtVal": 100.0, "coinVal": 1.0 } }),
            completed: json!([]),
            completed_all: json!([]),
            diff_data: json!([]),
            balances_error: None,
            diff_error: None,
            unreachable: Vec::new(),
            completed_all_failures: AtomicUsize::new(0),
            completed_calls: AtomicUsize::new(0),
            completed_all_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeUpstream {
    fn reachable(&self, server: &ServerConfig) -> Result<(), FeedError> {
        if self.unreachable.contains(&server.id.as_str()) {
            return Err(FeedError::ConnectionFailed(format!("{} refused", server.base_url)));
        }
        Ok(())
    }
}

#[async_trait]
impl BotServerApi for FakeUpstream {
    async fn fetch_status(&self, server: &ServerConfig) -> Result<String, FeedError> {
        self.reachable(server)?;
        Ok(self.status.clone())
    }

    async fn fetch_balances(&self, server: &ServerConfig) -> Result<Value, FeedError> {
        self.reachable(server)?;
        match self.balances_error {
            Some(error) => Err(error()),
            None => Ok(self.balances.clone()),
        }
    }

    async fn fetch_completed(&self, server: &ServerConfig) -> Result<Value, FeedError> {
        self.completed_calls.fetch_add(1, Ordering::SeqCst);
        self.reachable(server)?;
        Ok(self.completed.clone())
    }

    async fn fetch_completed_all(&self, server: &ServerConfig) -> Result<Value, FeedError> {
        self.completed_all_calls.fetch_add(1, Ordering::SeqCst);
        self.reachable(server)?;
        let remaining = self.completed_all_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.completed_all_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(FeedError::Timeout("GET /completedall".to_string()));
        }
        Ok(self.completed_all.clone())
    }

    async fn fetch_diff_data(&self, server: &ServerConfig) -> Result<Value, FeedError> {
        self.reachable(server)?;
        match self.diff_error {
            Some(error) => Err(error()),
            None => Ok(self.diff_data.clone()),
        }
    }
}

#[derive(Default)]
pub struct FakeExplorer {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ExplorerApi for FakeExplorer {
    async fn fetch_transactions(&self, _server: &ServerConfig) -> Result<Vec<Value>, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![])
    }
}

struct FixedPrice;

#[async_trait]
impl PriceApi for FixedPrice {
    async fn fetch_price(&self, _asset: NativeAsset) -> Result<f64, FeedError> {
        Ok(2000.0)
    }
}

/// Always-available channel that records what it was asked to send.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingChannel {
    pub fn titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .map(|sent| sent.iter().map(|m| m.title.clone()).collect())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Value, ChannelError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(json!({ "status": 200 }))
    }
}

pub struct Fixture {
    pub orchestrator: Orchestrator,
    pub upstream: Arc<FakeUpstream>,
    pub explorer: Arc<FakeExplorer>,
    pub channel: Arc<RecordingChannel>,
    pub clock: Arc<AtomicI64>,
}

pub async fn fixture(upstream: FakeUpstream) -> Fixture {
    fixture_with_servers(upstream, vec![ServerConfig::new("bnb", "BNB", "http://bnb.local:3001")]).await
}

pub async fn fixture_with_servers(upstream: FakeUpstream, servers: Vec<ServerConfig>) -> Fixture {
    let upstream = Arc::new(upstream);
    let explorer = Arc::new(FakeExplorer::default());
    let channel = Arc::new(RecordingChannel::default());
    let clock = Arc::new(AtomicI64::new(NOW));

    let reader = clock.clone();
    let registry = Registry::new(
        StoreLocation::InMemory,
        vec![channel.clone()],
        MonitorConfig::default().notification_rules,
    )
    .with_clock(Arc::new(move || reader.load(Ordering::SeqCst)));

    let orchestrator = Orchestrator::new(
        servers,
        registry,
        upstream.clone(),
        explorer.clone(),
        Arc::new(NativePriceCache::new(Arc::new(FixedPrice), PRICE_REFRESH_INTERVAL)),
    );

    Fixture {
        orchestrator,
        upstream,
        explorer,
        channel,
        clock,
    }
}
