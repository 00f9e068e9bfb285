//! Threshold evaluation.
//!
//! Turns raw detector findings into classified [`Issue`]s using the bounds of
//! a job's preset snapshot. Classification is a pure function; a finding
//! that cannot be classified is skipped on its own without affecting the
//! rest of the run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::aggregator::StatisticsAccumulator;
use crate::domain::preset::{detector_definition, metric_label};
use crate::domain::{
    Issue, MatchedBound, MetricStatistics, MetricThresholds, PresetParameters, Severity,
    SourceKind,
};

/// One raw reading produced by a detector run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFinding {
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default)]
    pub event_fired: bool,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    /// Optional human label for the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl RawFinding {
    /// A numeric reading of a filter metric.
    pub fn metric(source_id: impl Into<String>, metric_key: impl Into<String>, value: f64) -> Self {
        Self {
            source_id: source_id.into(),
            metric_key: Some(metric_key.into()),
            value: Some(value),
            event_fired: false,
            start_time: 0.0,
            end_time: None,
            label: None,
            details: Map::new(),
        }
    }

    /// A fired event with no numeric reading.
    pub fn event(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            metric_key: None,
            value: None,
            event_fired: true,
            start_time: 0.0,
            end_time: None,
            label: None,
            details: Map::new(),
        }
    }

    pub fn with_span(mut self, start_time: f64, end_time: f64) -> Self {
        self.start_time = start_time;
        self.end_time = Some(end_time);
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Input to [`classify`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Value(f64),
    /// A probe fired. A reading, if present, is classified numerically when
    /// the probe has bounds.
    Event { value: Option<f64> },
}

/// Result of classifying a measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub severity: Severity,
    pub matched_bound: Option<MatchedBound>,
}

/// Classify a measurement against a metric's thresholds.
///
/// Critical bounds are checked before non-critical ones. Returns `None` when
/// the value is within tolerance or is not finite.
pub fn classify(measurement: Measurement, thresholds: &MetricThresholds) -> Option<Classification> {
    match measurement {
        Measurement::Value(value) => classify_value(value, thresholds),
        Measurement::Event { value: Some(value) } if !thresholds.severity.is_empty() => {
            classify_value(value, thresholds)
        }
        Measurement::Event { .. } => Some(Classification {
            severity: thresholds.default_severity,
            matched_bound: None,
        }),
    }
}

fn classify_value(value: f64, thresholds: &MetricThresholds) -> Option<Classification> {
    if !value.is_finite() {
        return None;
    }
    let tiers = [
        (Severity::Critical, &thresholds.severity.critical),
        (Severity::NonCritical, &thresholds.severity.non_critical),
    ];
    tiers.into_iter().find_map(|(tier, bound)| {
        bound.violation(value).map(|(side, boundary)| Classification {
            severity: tier,
            matched_bound: Some(MatchedBound {
                tier,
                side,
                boundary,
            }),
        })
    })
}

/// Why a finding produced no issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnknownSource,
    UnknownMetric,
    MissingMetricKey,
    Disabled,
    NoMeasurement,
    NonFiniteValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFinding {
    pub source_id: String,
    pub metric_key: Option<String>,
    pub reason: SkipReason,
}

/// Output of [`evaluate_findings`].
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub issues: Vec<Issue>,
    pub statistics: Vec<MetricStatistics>,
    pub skipped: Vec<SkippedFinding>,
}

/// Classifies every finding of a run against a preset snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdEvaluator<'a> {
    parameters: &'a PresetParameters,
}

impl<'a> ThresholdEvaluator<'a> {
    pub fn new(parameters: &'a PresetParameters) -> Self {
        Self { parameters }
    }

    pub fn evaluate(&self, findings: &[RawFinding]) -> Evaluation {
        let mut issues = Vec::new();
        let mut skipped = Vec::new();
        let mut statistics = StatisticsAccumulator::new();

        for finding in findings {
            match self.evaluate_one(finding, &mut statistics) {
                Ok(Some(issue)) => issues.push(issue),
                Ok(None) => {}
                Err(reason) => {
                    if reason == SkipReason::Disabled {
                        debug!(source_id = %finding.source_id, "Skipping finding from disabled source");
                    } else {
                        warn!(
                            source_id = %finding.source_id,
                            metric_key = ?finding.metric_key,
                            ?reason,
                            "Skipping finding that cannot be classified"
                        );
                    }
                    skipped.push(SkippedFinding {
                        source_id: finding.source_id.clone(),
                        metric_key: finding.metric_key.clone(),
                        reason,
                    });
                }
            }
        }

        Evaluation {
            issues,
            statistics: statistics.finish(),
            skipped,
        }
    }

    fn evaluate_one(
        &self,
        finding: &RawFinding,
        statistics: &mut StatisticsAccumulator,
    ) -> Result<Option<Issue>, SkipReason> {
        if let Some(filter) = self.parameters.filter(&finding.source_id) {
            if !filter.enabled {
                return Err(SkipReason::Disabled);
            }
            let key = finding
                .metric_key
                .as_deref()
                .ok_or(SkipReason::MissingMetricKey)?;
            let thresholds = filter.metrics.get(key).ok_or(SkipReason::UnknownMetric)?;
            if !thresholds.enabled {
                return Err(SkipReason::Disabled);
            }
            let measurement = match (finding.value, finding.event_fired) {
                (Some(v), _) if !v.is_finite() => return Err(SkipReason::NonFiniteValue),
                (value, true) => Measurement::Event { value },
                (Some(v), false) => Measurement::Value(v),
                (None, false) => return Err(SkipReason::NoMeasurement),
            };
            if let Some(v) = finding.value {
                statistics.record(&finding.source_id, key, v);
            }
            let label = metric_label(&filter.id, key);
            return Ok(classify(measurement, thresholds)
                .map(|c| build_issue(SourceKind::Filter, finding, label, c, thresholds)));
        }

        if let Some(detector) = self.parameters.detector(&finding.source_id) {
            if !detector.enabled {
                return Err(SkipReason::Disabled);
            }
            if finding.value.is_some_and(|v| !v.is_finite()) {
                return Err(SkipReason::NonFiniteValue);
            }
            let thresholds = detector.as_thresholds();
            let label = detector_definition(&detector.id)
                .map(|def| def.name)
                .unwrap_or(detector.id.as_str());
            let measurement = Measurement::Event {
                value: finding.value,
            };
            return Ok(classify(measurement, &thresholds)
                .map(|c| build_issue(SourceKind::Detector, finding, label, c, &thresholds)));
        }

        Err(SkipReason::UnknownSource)
    }
}

fn build_issue(
    kind: SourceKind,
    finding: &RawFinding,
    source_label: &str,
    classification: Classification,
    thresholds: &MetricThresholds,
) -> Issue {
    let event = match (&finding.label, classification.matched_bound) {
        (Some(label), _) => label.clone(),
        (None, Some(matched)) => format!("{} {}", source_label, matched.side.label()),
        (None, None) => format!("{} detected", source_label),
    };

    let mut details = finding.details.clone();
    if let Some(matched) = classification.matched_bound {
        let bound = match matched.tier {
            Severity::Critical => thresholds.severity.critical,
            _ => thresholds.severity.non_critical,
        };
        details.insert("condition".to_string(), Value::String(bound.describe()));
    }

    debug!(
        source_id = %finding.source_id,
        metric_key = ?finding.metric_key,
        severity = %classification.severity,
        "Classified finding"
    );

    let mut issue = Issue::new(kind, &finding.source_id, event, classification.severity)
        .with_span(
            finding.start_time,
            finding.end_time.unwrap_or(finding.start_time),
        )
        .with_details(details);
    if let Some(key) = &finding.metric_key {
        issue = issue.with_metric_key(key);
    }
    if let Some(value) = finding.value {
        issue = issue.with_value(value);
    }
    if let Some(matched) = classification.matched_bound {
        issue = issue.with_matched_bound(matched);
    }
    issue
}

/// Shorthand for `ThresholdEvaluator::new(parameters).evaluate(findings)`.
pub fn evaluate_findings(findings: &[RawFinding], parameters: &PresetParameters) -> Evaluation {
    ThresholdEvaluator::new(parameters).evaluate(findings)
}
