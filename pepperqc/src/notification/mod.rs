//! Notification system module.
//!
//! Turns job lifecycle events into operator messages and delivers them
//! through the configured channels with retries.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pepperqc::notification::{NotificationService, NotificationServiceConfig};
//! use pepperqc::notification::channels::{TelegramChannel, TelegramConfig};
//!
//! let service = Arc::new(NotificationService::with_config(NotificationServiceConfig::default()));
//! for config in TelegramConfig::for_chats("123:ABC", ["1001"]) {
//!     service.add_channel(Arc::new(TelegramChannel::new(config)));
//! }
//! service.start(orchestrator.subscribe());
//! ```

pub mod channels;
pub mod events;
pub mod service;

pub use channels::{NotificationChannel, TelegramChannel, TelegramConfig};
pub use events::{JobEventKind, JobLifecycleEvent, NotificationPriority};
pub use service::{NotificationService, NotificationServiceConfig, NotificationStats};
