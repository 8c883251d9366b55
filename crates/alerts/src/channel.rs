//! Delivery channels.

use async_trait::async_trait;
use fleet_core::ChannelSettings;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Telegram API error: {0}")]
    Telegram(#[from] teloxide::RequestError),
    #[error("Webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Webhook responded with status {0}")]
    Status(u16),
    #[error("Email error: {0}")]
    Email(String),
    #[error("Channel not configured: {0}")]
    NotConfigured(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Telegram,
    /// Incoming-webhook messaging.
    Slack,
    Email,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Telegram => "telegram",
            ChannelKind::Slack => "slack",
            ChannelKind::Email => "email",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendered notification handed to a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub title: String,
    pub message: String,
    /// Email subject line.
    pub subject: String,
}

#[async_trait]
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Enabled and fully configured. Unavailable channels are never sent to.
    fn is_available(&self) -> bool;

    /// Deliver one message. Returns transport details for the audit log.
    async fn send(&self, message: &OutboundMessage) -> Result<Value, ChannelError>;
}

/// Build the three standard channels from settings.
pub fn build_channels(settings: &ChannelSettings) -> Vec<Arc<dyn Channel>> {
    vec![
        Arc::new(crate::telegram::TelegramChannel::new(settings.telegram.clone())),
        Arc::new(crate::webhook::WebhookChannel::new(settings.slack.clone())),
        Arc::new(crate::email::EmailChannel::new(settings.email.clone())),
    ]
}
