//! Cooldown-deduplicated, multi-channel alert dispatch.

use crate::channel::{Channel, OutboundMessage};
use fleet_core::{now_millis, NotificationRule, NotificationRules};
use fleet_store::{NotificationLogEntry, ServerStore, StoreError};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Cooldown used when neither the caller nor the rule supplies one.
pub const DEFAULT_COOLDOWN_MINUTES: f64 = 30.0;

/// Channel name recorded for dispatches that never reached a channel.
const SYSTEM_CHANNEL: &str = "system";

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Source of "now" in epoch millis.
pub type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// One alert request. Only `message` is required.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationPayload {
    pub title: Option<String>,
    pub message: String,
    pub subject: Option<String>,
    pub details: Option<Value>,
    /// Scopes the cooldown within the rule. `None` shares the rule-wide key.
    pub unique_key: Option<String>,
    pub cooldown_minutes: Option<f64>,
    /// Requested channels. Empty means every available channel.
    pub channels: Vec<String>,
}

impl NotificationPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_unique_key(mut self, key: impl Into<String>) -> Self {
        self.unique_key = Some(key.into());
        self
    }

    pub fn with_cooldown(mut self, minutes: f64) -> Self {
        self.cooldown_minutes = Some(minutes);
        self
    }

    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = channels;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Skipped,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Cooldown,
    NoChannels,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelResult {
    pub channel: String,
    pub status: DeliveryStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotifyOutcome {
    Skipped(SkipReason),
    Dispatched(Vec<ChannelResult>),
}

impl NotifyOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, NotifyOutcome::Dispatched(_))
    }
}

/// Per-server notifier. Cooldown state and the audit log live in the
/// server's own store.
pub struct Notifier {
    server_id: String,
    server_label: String,
    store: ServerStore,
    channels: Vec<Arc<dyn Channel>>,
    rules: Arc<NotificationRules>,
    clock: Clock,
}

impl Notifier {
    pub fn new(
        server_id: impl Into<String>,
        server_label: impl Into<String>,
        store: ServerStore,
        channels: Vec<Arc<dyn Channel>>,
        rules: Arc<NotificationRules>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            server_label: server_label.into(),
            store,
            channels,
            rules,
            clock: Box::new(now_millis),
        }
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn server_label(&self) -> &str {
        &self.server_label
    }

    pub fn store(&self) -> &ServerStore {
        &self.store
    }

    pub fn rule(&self, key: &str) -> Option<&NotificationRule> {
        self.rules.get(key)
    }

    pub fn rules(&self) -> &NotificationRules {
        &self.rules
    }

    pub fn state_key(&self, rule_key: &str, unique_key: Option<&str>) -> String {
        format!(
            "{}:{}:{}",
            self.server_id,
            rule_key,
            unique_key.unwrap_or("default")
        )
    }

    /// Caller override, then rule, then [`DEFAULT_COOLDOWN_MINUTES`].
    pub fn resolve_cooldown_minutes(&self, rule_key: &str, requested: Option<f64>) -> f64 {
        requested
            .or_else(|| self.rule(rule_key).and_then(|r| r.cooldown_minutes))
            .unwrap_or(DEFAULT_COOLDOWN_MINUTES)
    }

    /// Available channels, narrowed to `requested` when it names any.
    pub fn resolve_channels(&self, requested: &[String]) -> Vec<Arc<dyn Channel>> {
        self.channels
            .iter()
            .filter(|c| c.is_available())
            .filter(|c| {
                requested.is_empty()
                    || requested
                        .iter()
                        .any(|r| r.trim().eq_ignore_ascii_case(c.kind().as_str()))
            })
            .cloned()
            .collect()
    }

    /// Dispatch one alert unless its dedup key is cooling down.
    pub async fn notify(
        &self,
        rule_key: &str,
        payload: NotificationPayload,
    ) -> Result<NotifyOutcome, NotifierError> {
        let now = (self.clock)();
        let state_key = self.state_key(rule_key, payload.unique_key.as_deref());
        let cooldown_minutes = self.resolve_cooldown_minutes(rule_key, payload.cooldown_minutes);

        if cooldown_minutes.is_finite() && cooldown_minutes > 0.0 {
            if let Some(last_sent) = self.store.notification_last_sent(&state_key).await? {
                let window_ms = (cooldown_minutes * 60_000.0) as i64;
                if now - last_sent < window_ms {
                    debug!(rule = rule_key, key = %state_key, "Skipping alert: cooldown active");
                    return Ok(NotifyOutcome::Skipped(SkipReason::Cooldown));
                }
            }
        }

        let channels = self.resolve_channels(&payload.channels);

        let title = payload
            .title
            .clone()
            .unwrap_or_else(|| format!("{rule_key} alert"));
        let outbound = OutboundMessage {
            subject: payload
                .subject
                .clone()
                .unwrap_or_else(|| format!("[{}] {}", self.server_label, title)),
            title,
            message: payload.message.clone(),
        };
        let details = payload.details.clone().unwrap_or_else(|| json!({}));

        if channels.is_empty() {
            let entry = self.log_entry(
                rule_key,
                &outbound,
                SYSTEM_CHANNEL,
                DeliveryStatus::Skipped,
                with_field(&details, "reason", json!("no_channels_configured")),
            )?;
            self.append_log(&entry, now).await;
            info!(rule = rule_key, server = %self.server_id, "No channels configured; alert skipped");
            return Ok(NotifyOutcome::Skipped(SkipReason::NoChannels));
        }

        let mut results = Vec::with_capacity(channels.len());
        let mut entries = Vec::with_capacity(channels.len());
        for channel in &channels {
            let name = channel.kind().as_str();
            let (status, logged, error_text) = match channel.send(&outbound).await {
                Ok(transport) => {
                    info!(rule = rule_key, channel = name, server = %self.server_id, "Alert sent");
                    (
                        DeliveryStatus::Sent,
                        with_field(&details, "transport", transport),
                        None,
                    )
                }
                Err(e) => {
                    error!(rule = rule_key, channel = name, server = %self.server_id, error = %e, "Failed to send alert");
                    (
                        DeliveryStatus::Failed,
                        with_field(&details, "error", json!(e.to_string())),
                        Some(e.to_string()),
                    )
                }
            };
            entries.push(self.log_entry(rule_key, &outbound, name, status, logged)?);
            results.push(ChannelResult {
                channel: name.to_string(),
                status,
                error: error_text,
            });
        }

        self.store.record_dispatch(&entries, &state_key, now).await?;
        Ok(NotifyOutcome::Dispatched(results))
    }

    fn log_entry(
        &self,
        rule_key: &str,
        outbound: &OutboundMessage,
        channel: &str,
        status: DeliveryStatus,
        details: Value,
    ) -> Result<NotificationLogEntry, NotifierError> {
        Ok(NotificationLogEntry {
            server_id: self.server_id.clone(),
            rule: rule_key.to_string(),
            title: Some(outbound.title.clone()),
            channel: channel.to_string(),
            status: status.as_str().to_string(),
            message: Some(outbound.message.clone()),
            details: Some(serde_json::to_string(&details)?),
            created_at: String::new(),
        })
    }

    /// Skip rows are best effort; a failed write is only logged.
    async fn append_log(&self, entry: &NotificationLogEntry, at_millis: i64) {
        if let Err(e) = self.store.append_notification_log(entry, at_millis).await {
            warn!(rule = %entry.rule, channel = %entry.channel, error = %e, "Failed to append notification log");
        }
    }
}

/// Copy of `details` with `key` set. Non-object details are wrapped.
fn with_field(details: &Value, key: &str, value: Value) -> Value {
    let mut object = match details {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("details".to_string(), other.clone());
            map
        }
    };
    object.insert(key.to_string(), value);
    Value::Object(object)
}
