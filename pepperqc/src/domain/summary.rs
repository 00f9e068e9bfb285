//! Severity summaries and metric statistics attached to job results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::severity::{OverallSeverity, Severity};

/// Per-tier issue counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SeverityCounts {
    #[serde(default)]
    pub critical: u64,
    #[serde(default)]
    pub non_critical: u64,
    #[serde(default)]
    pub informational: u64,
}

impl SeverityCounts {
    pub const fn new(critical: u64, non_critical: u64, informational: u64) -> Self {
        Self {
            critical,
            non_critical,
            informational,
        }
    }

    pub fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::NonCritical => self.non_critical,
            Severity::Informational => self.informational,
        }
    }

    pub fn add(&mut self, severity: Severity, n: u64) {
        let slot = match severity {
            Severity::Critical => &mut self.critical,
            Severity::NonCritical => &mut self.non_critical,
            Severity::Informational => &mut self.informational,
        };
        *slot = slot.saturating_add(n);
    }

    pub fn total(&self) -> u64 {
        self.critical
            .saturating_add(self.non_critical)
            .saturating_add(self.informational)
    }

    /// Elementwise maximum.
    pub fn max(self, other: Self) -> Self {
        Self {
            critical: self.critical.max(other.critical),
            non_critical: self.non_critical.max(other.non_critical),
            informational: self.informational.max(other.informational),
        }
    }

    /// Highest tier with a non-zero count.
    pub fn overall(&self) -> OverallSeverity {
        Severity::ALL
            .into_iter()
            .find(|s| self.get(*s) > 0)
            .map(OverallSeverity::from)
            .unwrap_or(OverallSeverity::Clear)
    }
}

/// Counts plus the derived job-level tier.
///
/// `overall` is always recomputed from the counts, never trusted from input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "SeverityCounts")]
pub struct SeveritySummary {
    #[serde(flatten)]
    pub counts: SeverityCounts,
    pub overall: OverallSeverity,
}

impl SeveritySummary {
    pub fn total(&self) -> u64 {
        self.counts.total()
    }
}

impl From<SeverityCounts> for SeveritySummary {
    fn from(counts: SeverityCounts) -> Self {
        Self {
            overall: counts.overall(),
            counts,
        }
    }
}

/// Per-job scalar counters written by older releases alongside (or instead
/// of) the structured summary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LegacySeverityFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_issues: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_critical_issues: Option<u64>,
    /// Label-keyed counts; labels may use legacy names such as `high`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_counts: Option<BTreeMap<String, u64>>,
}

impl LegacySeverityFields {
    pub fn is_empty(&self) -> bool {
        self.critical_issues.is_none()
            && self.non_critical_issues.is_none()
            && self.severity_counts.is_none()
    }
}

/// Observed range of one numeric metric over a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStatistics {
    pub source_id: String,
    pub metric_key: String,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_rank() {
        assert_eq!(SeverityCounts::default().overall(), OverallSeverity::Clear);
        assert_eq!(
            SeverityCounts::new(0, 0, 4).overall(),
            OverallSeverity::Informational
        );
        assert_eq!(
            SeverityCounts::new(0, 1, 4).overall(),
            OverallSeverity::NonCritical
        );
        assert_eq!(
            SeverityCounts::new(1, 1, 0).overall(),
            OverallSeverity::Critical
        );
    }

    #[test]
    fn test_summary_serde_recomputes_overall() {
        let summary = SeveritySummary::from(SeverityCounts::new(1, 0, 0));
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "critical": 1,
                "non_critical": 0,
                "informational": 0,
                "overall": "critical"
            })
        );

        let stale: SeveritySummary =
            serde_json::from_str(r#"{"critical": 0, "non_critical": 2, "overall": "clear"}"#)
                .unwrap();
        assert_eq!(stale.overall, OverallSeverity::NonCritical);
        assert_eq!(stale.counts.informational, 0);
    }
}
