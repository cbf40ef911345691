//! Telegram Bot API delivery.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::services::sink::{DeliverySink, SinkError};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Sends MarkdownV2 messages through `sendMessage`; the recipient is the chat id.
pub struct TelegramSink {
    client: Client,
    api_url: String,
    bot_token: String,
}

impl TelegramSink {
    pub fn new(bot_token: impl Into<String>) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(Self::with_client(DEFAULT_API_URL, bot_token, client))
    }

    pub fn with_client(
        api_url: impl Into<String>,
        bot_token: impl Into<String>,
        client: Client,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_url, self.bot_token)
    }
}

#[async_trait]
impl DeliverySink for TelegramSink {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), SinkError> {
        let request = SendMessageRequest {
            chat_id: recipient,
            text,
            parse_mode: "MarkdownV2",
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(recipient = %recipient, "Telegram message sent");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!(
            recipient = %recipient,
            status = status.as_u16(),
            body = %body,
            "Telegram rejected message: {}",
            status
        );
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
