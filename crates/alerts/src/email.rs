//! SMTP email channel.

use crate::channel::{Channel, ChannelError, ChannelKind, OutboundMessage};
use async_trait::async_trait;
use fleet_core::EmailSettings;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::{json, Value};

pub struct EmailChannel {
    settings: EmailSettings,
}

impl EmailChannel {
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, ChannelError> {
        let host = self.settings.smtp_host.trim();
        let builder = if self.settings.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| ChannelError::Email(e.to_string()))?;

        let mut builder = builder.port(self.settings.smtp_port);
        let user = self.settings.user.trim();
        if !user.is_empty() {
            builder = builder.credentials(Credentials::new(
                user.to_string(),
                self.settings.pass.clone(),
            ));
        }
        Ok(builder.build())
    }

    /// Build the message for every configured recipient.
    pub fn build_message(&self, message: &OutboundMessage) -> Result<Message, ChannelError> {
        let recipients = self.settings.recipients();
        if recipients.is_empty() {
            return Err(ChannelError::Email("No email recipients configured".to_string()));
        }

        let from: Mailbox = self
            .settings
            .from
            .trim()
            .parse()
            .map_err(|e: lettre::address::AddressError| ChannelError::Email(e.to_string()))?;
        let mut builder = Message::builder().from(from).subject(message.subject.clone());
        for recipient in recipients {
            let to: Mailbox = recipient
                .parse()
                .map_err(|e: lettre::address::AddressError| ChannelError::Email(e.to_string()))?;
            builder = builder.to(to);
        }

        builder
            .header(ContentType::TEXT_PLAIN)
            .body(message.message.clone())
            .map_err(|e| ChannelError::Email(e.to_string()))
    }
}

#[async_trait]
impl Channel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn is_available(&self) -> bool {
        self.settings.is_available()
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Value, ChannelError> {
        if !self.is_available() {
            return Err(ChannelError::NotConfigured("email"));
        }
        let email = self.build_message(message)?;
        let response = self
            .transport()?
            .send(email)
            .await
            .map_err(|e| ChannelError::Email(e.to_string()))?;
        Ok(json!({ "code": response.code().to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(to: &str) -> EmailSettings {
        EmailSettings {
            enabled: true,
            smtp_host: "smtp.example.com".to_string(),
            from: "monitor@example.com".to_string(),
            to: to.to_string(),
            ..Default::default()
        }
    }

    fn outbound() -> OutboundMessage {
        OutboundMessage {
            title: "Poll Failed".to_string(),
            message: "Failed to fetch balances".to_string(),
            subject: "[BNB] Poll Failed".to_string(),
        }
    }

    #[test]
    fn test_message_has_every_recipient() {
        let channel = EmailChannel::new(settings("a@example.com; b@example.com"));
        let email = channel.build_message(&outbound()).unwrap();
        let to: Vec<String> = email
            .envelope()
            .to()
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert_eq!(to, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_bad_address_is_an_error() {
        let channel = EmailChannel::new(settings("not-an-address"));
        assert!(matches!(
            channel.build_message(&outbound()),
            Err(ChannelError::Email(_))
        ));
    }
}
