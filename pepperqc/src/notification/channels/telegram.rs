//! Telegram Bot API notification channel.
//!
//! Sends messages via the Telegram Bot API (`POST /bot<token>/sendMessage`).
//! Handles 429 rate limits by respecting the `parameters.retry_after` field
//! returned in the JSON response body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::NotificationChannel;
use crate::notification::events::{JobLifecycleEvent, NotificationPriority};
use crate::{Error, Result};

/// Default Bot API endpoint.
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Telegram channel configuration. One channel delivers to one chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Target chat ID (user, group, or channel).
    pub chat_id: String,
    /// Bot API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Parse mode (HTML, Markdown, MarkdownV2). Plain text when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    /// Minimum priority level to send (default: Normal).
    #[serde(default)]
    pub min_priority: NotificationPriority,
}

fn default_api_base() -> String {
    DEFAULT_TELEGRAM_API_BASE.to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: default_api_base(),
            parse_mode: None,
            min_priority: NotificationPriority::Normal,
        }
    }
}

impl TelegramConfig {
    /// One enabled config per chat id, sharing a bot token.
    pub fn for_chats<I, S>(bot_token: &str, chat_ids: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        chat_ids
            .into_iter()
            .map(|id| -> String { id.into() })
            .filter(|id| !id.trim().is_empty())
            .map(|chat_id| Self {
                enabled: true,
                bot_token: bot_token.to_string(),
                chat_id: chat_id.trim().to_string(),
                ..Self::default()
            })
            .collect()
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

/// Telegram notification channel.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel.
    pub fn new(config: TelegramConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });
        Self { config, client }
    }

    fn is_html(&self) -> bool {
        self.config
            .parse_mode
            .as_deref()
            .is_some_and(|mode| mode.eq_ignore_ascii_case("HTML"))
    }

    /// Build the message text for an event.
    fn build_message(&self, event: &JobLifecycleEvent) -> String {
        let text = if self.is_html() {
            format!(
                "<b>{}</b>\n{}",
                escape_html(&event.title()),
                escape_html(&event.description())
            )
        } else {
            event.message()
        };
        truncate_message(&text, TELEGRAM_MESSAGE_LIMIT)
    }

    fn url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    /// Send request with rate limit handling.
    async fn send_with_retry(&self, payload: &serde_json::Value) -> Result<()> {
        let url = self.url();
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&url)
                .json(payload)
                .send()
                .await
                .map_err(|e| Error::Notification(format!("Telegram request failed: {}", e)))?;

            let status = response.status();

            if status.is_success() {
                let body: serde_json::Value = response.json().await.unwrap_or_default();
                if body.get("ok").and_then(|v| v.as_bool()) == Some(false) {
                    return Err(Error::Notification(format!(
                        "Telegram rejected message: {}",
                        body.get("description")
                            .and_then(|v| v.as_str())
                            .unwrap_or("no description")
                    )));
                }
                return Ok(());
            }

            if status.as_u16() == 429 {
                let body: serde_json::Value = response.json().await.unwrap_or_default();

                let retry_after = body
                    .get("parameters")
                    .and_then(|p| p.get("retry_after"))
                    .and_then(|v| v.as_u64())
                    .map(Duration::from_secs);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Telegram rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(Error::Notification(format!(
                        "Telegram rate limit exceeded after {} retries",
                        MAX_RATE_LIMIT_RETRIES
                    )));
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Telegram rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "Telegram sendMessage failed: {} - {}",
                status, body
            )));
        }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn channel_type(&self) -> &'static str {
        "telegram"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.bot_token.is_empty() && !self.config.chat_id.is_empty()
    }

    async fn send(&self, event: &JobLifecycleEvent) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        if event.priority() < self.config.min_priority {
            debug!(
                "Skipping Telegram notification for {} (priority {} < {})",
                event.event_type(),
                event.priority(),
                self.config.min_priority
            );
            return Ok(());
        }

        let mut payload = json!({
            "chat_id": self.config.chat_id,
            "text": self.build_message(event),
            "disable_notification": event.priority() == NotificationPriority::Low,
        });
        if let Some(mode) = &self.config.parse_mode {
            payload["parse_mode"] = json!(mode);
        }

        self.send_with_retry(&payload).await?;

        debug!(job_id = %event.job_id, "Telegram notification sent: {}", event.event_type());
        Ok(())
    }

    async fn test(&self) -> Result<()> {
        let payload = json!({
            "chat_id": self.config.chat_id,
            "text": "PepperQC notifications are configured",
        });
        self.send_with_retry(&payload).await
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Truncate a message to fit within the Telegram character limit.
fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let keep = limit.saturating_sub(suffix.len());
    let truncated: String = text.chars().take(keep).collect();
    format!("{truncated}{suffix}")
}
