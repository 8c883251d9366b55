//! Per-server handles reused for the life of the process.

use dashmap::DashMap;
use fleet_alerts::{Channel, Notifier};
use fleet_core::{now_millis, NotificationRules, ServerConfig};
use fleet_store::{ServerStore, StoreError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Shared source of "now" in epoch millis.
pub type SharedClock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Where per-server databases live.
#[derive(Debug, Clone)]
pub enum StoreLocation {
    /// One `data-{id}.sqlite` file per server.
    Directory(PathBuf),
    /// Private in-memory database per server.
    InMemory,
}

impl StoreLocation {
    pub fn path_for(&self, server_id: &str) -> Option<PathBuf> {
        match self {
            StoreLocation::Directory(dir) => Some(dir.join(format!("data-{server_id}.sqlite"))),
            StoreLocation::InMemory => None,
        }
    }
}

pub struct ServerContext {
    pub server: ServerConfig,
    pub store: ServerStore,
    pub notifier: Notifier,
}

pub struct Registry {
    location: StoreLocation,
    channels: Vec<Arc<dyn Channel>>,
    rules: Arc<NotificationRules>,
    clock: SharedClock,
    contexts: DashMap<String, Arc<ServerContext>>,
}

impl Registry {
    pub fn new(
        location: StoreLocation,
        channels: Vec<Arc<dyn Channel>>,
        rules: NotificationRules,
    ) -> Self {
        Self {
            location,
            channels,
            rules: Arc::new(rules),
            clock: Arc::new(now_millis),
            contexts: DashMap::new(),
        }
    }

    /// Replace the wall clock for notifiers and time windows.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    pub fn rules(&self) -> &NotificationRules {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Context for `server`, opening its store on first use.
    pub async fn context(&self, server: &ServerConfig) -> Result<Arc<ServerContext>, StoreError> {
        if let Some(existing) = self.contexts.get(&server.id) {
            return Ok(existing.clone());
        }

        let store = match self.location.path_for(&server.id) {
            Some(path) => ServerStore::connect(&path).await?,
            None => ServerStore::in_memory().await?,
        };
        let clock = self.clock.clone();
        let notifier = Notifier::new(
            server.id.clone(),
            server.display_name(),
            store.clone(),
            self.channels.clone(),
            self.rules.clone(),
        )
        .with_clock(Box::new(move || clock()));

        let context = Arc::new(ServerContext {
            server: server.clone(),
            store,
            notifier,
        });
        info!(server = %server.id, "Server context ready");

        // A concurrent caller may have won the race; keep whichever landed first.
        Ok(self
            .contexts
            .entry(server.id.clone())
            .or_insert(context)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_path() {
        let location = StoreLocation::Directory(PathBuf::from("/var/lib/fleet"));
        assert_eq!(
            location.path_for("bnb"),
            Some(PathBuf::from("/var/lib/fleet/data-bnb.sqlite"))
        );
        assert_eq!(StoreLocation::InMemory.path_for("bnb"), None);
    }

    #[tokio::test]
    async fn test_context_is_reused() {
        let registry = Registry::new(StoreLocation::InMemory, vec![], NotificationRules::new());
        let server = ServerConfig::new("bnb", "BNB", "http://127.0.0.1:3001");

        let first = registry.context(&server).await.unwrap();
        first.store.record_notification_sent("k", 1).await.unwrap();
        let second = registry.context(&server).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(second.store.notification_last_sent("k").await.unwrap(), Some(1));
    }
}
