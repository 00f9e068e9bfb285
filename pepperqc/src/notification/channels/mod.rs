//! Notification channels.
//!
//! - Telegram Bot API

mod telegram;

pub use telegram::{DEFAULT_TELEGRAM_API_BASE, TelegramChannel, TelegramConfig};

use async_trait::async_trait;

use super::events::JobLifecycleEvent;
use crate::Result;

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Check if the channel is enabled.
    fn is_enabled(&self) -> bool;

    /// Deliver one lifecycle event.
    async fn send(&self, event: &JobLifecycleEvent) -> Result<()>;

    /// Send a test message.
    async fn test(&self) -> Result<()>;
}
