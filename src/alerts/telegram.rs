use async_trait::async_trait;
use tracing::debug;

use crate::alerts::{ChannelError, TelegramSender};

const API_BASE: &str = "https://api.telegram.org";

/// Thin wrapper over the Telegram Bot API `sendMessage` call
pub struct TelegramChannel {
    client: reqwest::Client,
    bot_token: String,
}

impl TelegramChannel {
    pub fn new(bot_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
        }
    }
}

#[async_trait]
impl TelegramSender for TelegramChannel {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let url = format!("{API_BASE}/bot{}/sendMessage", self.bot_token);
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        let body: serde_json::Value = response.json().await?;

        if body.get("ok").and_then(|v| v.as_bool()) == Some(true) {
            debug!(%chat_id, "telegram message delivered");
            Ok(())
        } else {
            let description = body
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("no description");
            Err(ChannelError::Telegram(format!("{status}: {description}")))
        }
    }
}
