//! Logging setup with local timezone timestamps.

use chrono::Local;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "pepperqc=info";

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Parse a filter directive string.
pub fn parse_filter(filter: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| Error::config(format!("Invalid log filter '{}': {}", filter, e)))
}

/// Install the global subscriber. Console output, JSON lines when `json`.
pub fn init_logging(filter: &str, json: bool) -> Result<()> {
    let filter = parse_filter(filter)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(fmt::layer().json().with_timer(LocalTimer))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
            .try_init()
    };
    result.map_err(|e| Error::Other(format!("Failed to set global default subscriber: {}", e)))
}
