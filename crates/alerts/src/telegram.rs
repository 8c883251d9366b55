//! Telegram bot channel.

use crate::channel::{Channel, ChannelError, ChannelKind, OutboundMessage};
use async_trait::async_trait;
use fleet_core::TelegramSettings;
use serde_json::{json, Value};
use teloxide::prelude::*;
use teloxide::types::Recipient;

pub struct TelegramChannel {
    settings: TelegramSettings,
    bot: Bot,
}

impl TelegramChannel {
    pub fn new(settings: TelegramSettings) -> Self {
        let bot = Bot::new(settings.bot_token.trim());
        Self { settings, bot }
    }

    /// Numeric ids address chats directly; anything else is a channel username.
    fn recipient(&self) -> Recipient {
        let chat_id = self.settings.chat_id.trim();
        match chat_id.parse::<i64>() {
            Ok(id) => Recipient::Id(ChatId(id)),
            Err(_) => Recipient::ChannelUsername(chat_id.to_string()),
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    fn is_available(&self) -> bool {
        self.settings.is_available()
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Value, ChannelError> {
        if !self.is_available() {
            return Err(ChannelError::NotConfigured("telegram"));
        }
        let text = if message.title.is_empty() {
            message.message.clone()
        } else {
            format!("{}\n{}", message.title, message.message)
        };
        let sent = self.bot.send_message(self.recipient(), text).await?;
        Ok(json!({ "ok": true, "messageId": sent.id.0 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(chat_id: &str) -> TelegramChannel {
        TelegramChannel::new(TelegramSettings {
            enabled: true,
            bot_token: "123:abc".to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    #[test]
    fn test_recipient_parsing() {
        assert_eq!(channel("-100123").recipient(), Recipient::Id(ChatId(-100123)));
        assert_eq!(
            channel("@fleet_alerts").recipient(),
            Recipient::ChannelUsername("@fleet_alerts".to_string())
        );
    }
}
