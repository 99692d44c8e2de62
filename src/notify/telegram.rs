//! Telegram Bot API sink.
//!
//! Delivers notifications with `sendMessage` to a single chat.
//! API docs: https://core.telegram.org/bots/api#sendmessage

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use super::MessageSink;
use crate::config::AppConfig;

const BASE_URL: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

pub struct TelegramSink {
    client: Client,
    base_url: String,
    token: SecretString,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(token: SecretString, chat_id: String) -> Result<Self> {
        Self::with_base_url(BASE_URL, token, chat_id)
    }

    pub fn with_base_url(base_url: &str, token: SecretString, chat_id: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            chat_id,
        })
    }

    /// Resolve token and chat id from the named environment variables.
    pub fn from_env(token_env: &str, chat_id_env: &str) -> Result<Self> {
        let token = AppConfig::resolve_env(token_env)?;
        let chat_id = AppConfig::resolve_env(chat_id_env)?;
        Self::new(SecretString::new(token), chat_id)
    }
}

#[async_trait]
impl MessageSink for TelegramSink {
    async fn send(&self, text: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.base_url,
            self.token.expose_secret()
        );
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
        };

        self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Telegram request failed")?
            .error_for_status()
            .context("Telegram rejected the message")?;

        debug!(chat_id = %self.chat_id, "Telegram notification sent");
        Ok(())
    }
}
