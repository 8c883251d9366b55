//! Incoming-webhook channel (Slack-compatible `{"text": ...}` payloads).

use crate::channel::{Channel, ChannelError, ChannelKind, OutboundMessage};
use async_trait::async_trait;
use fleet_core::SlackSettings;
use serde_json::{json, Value};
use std::time::Duration;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

pub struct WebhookChannel {
    settings: SlackSettings,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(settings: SlackSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }
}

/// Bold title line followed by the body.
pub fn webhook_text(message: &OutboundMessage) -> String {
    if message.title.is_empty() {
        message.message.clone()
    } else {
        format!("*{}*\n{}", message.title, message.message)
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    fn is_available(&self) -> bool {
        self.settings.is_available()
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Value, ChannelError> {
        if !self.is_available() {
            return Err(ChannelError::NotConfigured("slack"));
        }
        let response = self
            .client
            .post(self.settings.webhook_url.trim())
            .timeout(WEBHOOK_TIMEOUT)
            .json(&json!({ "text": webhook_text(message) }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Status(status.as_u16()));
        }
        Ok(json!({ "status": status.as_u16() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_text() {
        let message = OutboundMessage {
            title: "Low Gas: BNB".to_string(),
            message: "Gas for 0xabc is 1.2".to_string(),
            subject: String::new(),
        };
        assert_eq!(webhook_text(&message), "*Low Gas: BNB*\nGas for 0xabc is 1.2");
    }
}
