//! Notification service implementation.
//!
//! The NotificationService is responsible for:
//! - Listening to job lifecycle events
//! - Dispatching notifications to configured channels
//! - Retrying failed deliveries with exponential backoff

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::channels::NotificationChannel;
use super::events::{JobEventKind, JobLifecycleEvent};
use crate::{Error, Result};

/// Configuration for the notification service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationServiceConfig {
    /// Whether the notification service is enabled.
    pub enabled: bool,
    /// Maximum retry attempts per delivery.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
    /// Also deliver `started` events.
    pub notify_started: bool,
}

impl Default for NotificationServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            initial_retry_delay_ms: 5000,
            max_retry_delay_ms: 60000,
            notify_started: false,
        }
    }
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationStats {
    /// Deliveries that reached a channel.
    pub sent: u64,
    /// Deliveries abandoned after all retries.
    pub failed: u64,
    /// Number of configured channels.
    pub channel_count: usize,
}

/// Fans lifecycle events out to notification channels.
pub struct NotificationService {
    config: NotificationServiceConfig,
    channels: RwLock<Vec<Arc<dyn NotificationChannel>>>,
    sent: AtomicU64,
    failed: AtomicU64,
    cancellation_token: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationService {
    pub fn new() -> Self {
        Self::with_config(NotificationServiceConfig::default())
    }

    pub fn with_config(config: NotificationServiceConfig) -> Self {
        Self {
            config,
            channels: RwLock::new(Vec::new()),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancellation_token: CancellationToken::new(),
            listener: Mutex::new(None),
        }
    }

    /// Register a channel.
    pub fn add_channel(&self, channel: Arc<dyn NotificationChannel>) {
        info!("Added {} notification channel", channel.channel_type());
        self.channels.write().push(channel);
    }

    /// Whether `event` is delivered at all under this configuration.
    pub fn should_notify(&self, event: &JobLifecycleEvent) -> bool {
        self.config.enabled && (event.kind != JobEventKind::Started || self.config.notify_started)
    }

    /// Deliver one event to every enabled channel.
    ///
    /// Each channel is retried independently. Fails if any channel gave up.
    pub async fn notify(&self, event: &JobLifecycleEvent) -> Result<()> {
        if !self.should_notify(event) {
            return Ok(());
        }

        let channels: Vec<_> = self
            .channels
            .read()
            .iter()
            .filter(|c| c.is_enabled())
            .cloned()
            .collect();
        if channels.is_empty() {
            debug!(job_id = %event.job_id, "No notification channels for {}", event.event_type());
            return Ok(());
        }

        let results = join_all(
            channels
                .iter()
                .map(|channel| self.deliver_with_retry(channel.as_ref(), event)),
        )
        .await;

        let failures = results.iter().filter(|r| r.is_err()).count();
        if failures > 0 {
            return Err(Error::Notification(format!(
                "{} of {} channel(s) failed to deliver {} for job {}",
                failures,
                results.len(),
                event.event_type(),
                event.job_id
            )));
        }
        Ok(())
    }

    async fn deliver_with_retry(
        &self,
        channel: &dyn NotificationChannel,
        event: &JobLifecycleEvent,
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            match channel.send(event).await {
                Ok(()) => {
                    self.sent.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(e) if attempt < self.config.max_retries => {
                    let delay = self.calculate_retry_delay(attempt);
                    warn!(
                        job_id = %event.job_id,
                        "{} delivery of {} failed (attempt {}), retrying in {:?}: {}",
                        channel.channel_type(),
                        event.event_type(),
                        attempt + 1,
                        delay,
                        e
                    );
                    attempt += 1;
                    tokio::select! {
                        _ = self.cancellation_token.cancelled() => {
                            self.failed.fetch_add(1, Ordering::Relaxed);
                            return Err(e);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        job_id = %event.job_id,
                        "{} delivery of {} abandoned after {} attempts: {}",
                        channel.channel_type(),
                        event.event_type(),
                        attempt + 1,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Calculate retry delay with exponential backoff.
    fn calculate_retry_delay(&self, attempts: u32) -> Duration {
        let base_delay = self.config.initial_retry_delay_ms;
        let max_delay = self.config.max_retry_delay_ms;

        // Exponential backoff: delay = base * 2^attempts
        let delay_ms = base_delay.saturating_mul(2u64.saturating_pow(attempts));
        Duration::from_millis(delay_ms.min(max_delay))
    }

    pub fn stats(&self) -> NotificationStats {
        NotificationStats {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            channel_count: self.channels.read().len(),
        }
    }

    /// Start delivering events from `rx`.
    ///
    /// Events are delivered one at a time so that messages for a job arrive
    /// in transition order.
    pub fn start(self: &Arc<Self>, mut rx: broadcast::Receiver<JobLifecycleEvent>) {
        let service = Arc::clone(self);
        let cancellation_token = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        // Flush what was already published.
                        while let Ok(event) = rx.try_recv() {
                            service.dispatch(&event).await;
                        }
                        debug!("Lifecycle event listener shutting down");
                        break;
                    }
                    result = rx.recv() => {
                        match result {
                            Ok(event) => service.dispatch(&event).await,
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!("Lifecycle event listener lagged by {} events", n);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Lifecycle event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
        *self.listener.lock() = Some(handle);
    }

    async fn dispatch(&self, event: &JobLifecycleEvent) {
        if let Err(e) = self.notify(event).await {
            warn!("Failed to dispatch notification: {}", e);
        }
    }

    /// Stop the listener after flushing pending events.
    pub async fn stop(&self) {
        info!("Stopping notification service");
        self.cancellation_token.cancel();
        let handle = self.listener.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("Notification service stopped");
    }
}
