//! Classified findings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::bounds::BoundSide;
use super::severity::Severity;

/// Whether a finding came from a numeric filter or an event detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Filter,
    Detector,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Detector => "detector",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The bound that decided an issue's tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchedBound {
    pub tier: Severity,
    pub side: BoundSide,
    pub boundary: f64,
}

/// One classified finding attached to a job result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub source_kind: SourceKind,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_key: Option<String>,
    /// Short human description, e.g. "Luma Average (Y) above maximum".
    pub event: String,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_bound: Option<MatchedBound>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl Issue {
    pub fn new(
        source_kind: SourceKind,
        source_id: impl Into<String>,
        event: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            source_kind,
            source_id: source_id.into(),
            metric_key: None,
            event: event.into(),
            start_time: 0.0,
            end_time: 0.0,
            duration: 0.0,
            value: None,
            severity,
            matched_bound: None,
            details: Map::new(),
        }
    }

    pub fn with_metric_key(mut self, key: impl Into<String>) -> Self {
        self.metric_key = Some(key.into());
        self
    }

    /// Set the time span. An end before the start collapses to the start.
    pub fn with_span(mut self, start_time: f64, end_time: f64) -> Self {
        let start = if start_time.is_finite() { start_time } else { 0.0 };
        let end = if end_time.is_finite() && end_time >= start {
            end_time
        } else {
            start
        };
        self.start_time = start;
        self.end_time = end;
        self.duration = end - start;
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_matched_bound(mut self, matched: MatchedBound) -> Self {
        self.matched_bound = Some(matched);
        self
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = details;
        self
    }
}
