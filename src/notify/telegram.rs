use super::Notifier;
use crate::{BotError, Result};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Sends messages to one Telegram chat through the Bot API
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> anyhow::Result<Self> {
        Self::with_base_url(TELEGRAM_API_BASE, bot_token, chat_id)
    }

    pub fn with_base_url(base_url: &str, bot_token: String, chat_id: String) -> anyhow::Result<Self> {
        Self::with_timeout(
            base_url,
            bot_token,
            chat_id,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
    }

    /// Every request, body read included, is abandoned after `timeout`
    pub fn with_timeout(
        base_url: &str,
        bot_token: String,
        chat_id: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BotError::NotifierFailure(e.to_string()))?;

        let status = response.status();
        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| BotError::NotifierFailure(format!("HTTP {}: {}", status.as_u16(), e)))?;

        if !body.ok {
            return Err(BotError::NotifierFailure(
                body.description
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            ));
        }

        Ok(())
    }
}
