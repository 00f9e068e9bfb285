//! Environment-driven application configuration.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::logging::DEFAULT_LOG_FILTER;
use crate::notification::{NotificationServiceConfig, TelegramConfig};
use crate::pipeline::{JobQueueConfig, ProcessDetectorConfig, PurgeConfig, WorkerPoolConfig};
use crate::{Error, Result};

/// Top-level configuration for the service binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub worker_pool: WorkerPoolConfig,
    pub queue: JobQueueConfig,
    pub detector: ProcessDetectorConfig,
    /// Directory for persisted job records. In-memory only when unset.
    pub job_store_dir: Option<PathBuf>,
    pub purge: PurgeConfig,
    pub notification: NotificationServiceConfig,
    /// One entry per Telegram chat.
    pub telegram: Vec<TelegramConfig>,
    pub log_filter: String,
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            worker_pool: WorkerPoolConfig::default(),
            queue: JobQueueConfig::default(),
            detector: ProcessDetectorConfig::default(),
            job_store_dir: None,
            purge: PurgeConfig::default(),
            notification: NotificationServiceConfig::default(),
            telegram: Vec::new(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Unset or blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        config.worker_pool.max_workers =
            parse_or(&get, "PEPPERQC_WORKERS", config.worker_pool.max_workers)?;
        if config.worker_pool.max_workers == 0 {
            return Err(Error::config("PEPPERQC_WORKERS must be at least 1"));
        }
        config.worker_pool.job_timeout_secs = parse_or(
            &get,
            "PEPPERQC_JOB_TIMEOUT_SECS",
            config.worker_pool.job_timeout_secs,
        )?;
        config.worker_pool.poll_interval_ms = parse_or(
            &get,
            "PEPPERQC_POLL_INTERVAL_MS",
            config.worker_pool.poll_interval_ms,
        )?;

        if let Some(command) = get("PEPPERQC_DETECTOR_CMD") {
            config.detector.command = command;
        }
        if let Some(args) = get("PEPPERQC_DETECTOR_ARGS") {
            config.detector.args = args.split_whitespace().map(str::to_string).collect();
        }

        config.job_store_dir = get("PEPPERQC_JOB_STORE_DIR").map(PathBuf::from);
        config.purge.retention_days =
            parse_or(&get, "PEPPERQC_RETENTION_DAYS", config.purge.retention_days)?;
        config.purge.check_interval_secs = parse_or(
            &get,
            "PEPPERQC_PURGE_INTERVAL_SECS",
            config.purge.check_interval_secs,
        )?;
        config.purge.remove_media =
            parse_bool_or(&get, "PEPPERQC_PURGE_MEDIA", config.purge.remove_media)?;

        config.notification.notify_started = parse_bool_or(
            &get,
            "PEPPERQC_NOTIFY_STARTED",
            config.notification.notify_started,
        )?;
        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            let chats = get("TELEGRAM_CHAT_IDS").unwrap_or_default();
            config.telegram = TelegramConfig::for_chats(&token, chats.split(','));
            if let Some(base) = get("TELEGRAM_API_BASE") {
                for telegram in &mut config.telegram {
                    telegram.api_base = base.clone();
                }
            }
        }

        if let Some(filter) = get("PEPPERQC_LOG_FILTER").or_else(|| get("RUST_LOG")) {
            config.log_filter = filter;
        }
        config.log_json = parse_bool_or(&get, "PEPPERQC_LOG_JSON", config.log_json)?;

        Ok(config)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::config(format!("Invalid {}='{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool_or<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!("Invalid {}='{}': expected a boolean", key, raw))),
    }
}
