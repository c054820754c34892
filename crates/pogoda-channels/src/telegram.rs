//! Telegram Bot channel: message sending via the Bot API.

use async_trait::async_trait;
use pogoda_core::config::TelegramConfig;
use pogoda_core::error::{PogodaError, Result};
use pogoda_core::traits::{AdapterFailure, DeliveryGateway};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Telegram Bot API client used as the delivery gateway.
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PogodaError::Delivery(format!("HTTP client: {e}")))?;
        Ok(Self {
            bot_token: config.bot_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Send a Markdown text message.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> std::result::Result<(), AdapterFailure> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(request_failure)?;

        let status = response.status();
        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| AdapterFailure::unavailable(format!("Invalid send response ({status}): {e}")))?;

        if !result.ok {
            return Err(api_failure(status.as_u16(), &result));
        }
        tracing::debug!("📤 Telegram message sent to {chat_id}");
        Ok(())
    }

    /// Get bot info. Used at startup to check the token.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| PogodaError::Delivery(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| PogodaError::Delivery(format!("Invalid getMe response: {e}")))?;
        if !body.ok {
            return Err(PogodaError::Config(format!(
                "Telegram rejected the bot token: {}",
                body.description.unwrap_or_default()
            )));
        }
        body.result
            .ok_or_else(|| PogodaError::Delivery("No bot info".into()))
    }
}

#[async_trait]
impl DeliveryGateway for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, channel_id: &str, text: &str) -> std::result::Result<(), AdapterFailure> {
        self.send_message(channel_id, text).await
    }
}

fn request_failure(e: reqwest::Error) -> AdapterFailure {
    if e.is_timeout() {
        AdapterFailure::timeout(format!("sendMessage timed out: {e}"))
    } else {
        AdapterFailure::unavailable(format!("sendMessage failed: {e}"))
    }
}

/// Map an `ok: false` answer to a failure kind.
fn api_failure<T>(status: u16, response: &TelegramApiResponse<T>) -> AdapterFailure {
    let code = response.error_code.unwrap_or(status);
    let description = response.description.clone().unwrap_or_default();
    match code {
        429 => {
            let wait = response
                .parameters
                .as_ref()
                .and_then(|p| p.retry_after)
                .map(|s| format!(" (retry after {s}s)"))
                .unwrap_or_default();
            AdapterFailure::rate_limited(format!("Telegram flood control{wait}: {description}"))
        }
        // Blocked by the user, chat gone, bad token: resending will not help.
        400 | 401 | 403 | 404 => AdapterFailure::rejected(format!("Telegram {code}: {description}")),
        _ => AdapterFailure::unavailable(format!("Telegram {code}: {description}")),
    }
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<u16>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}
