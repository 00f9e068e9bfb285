//! Severity aggregation.
//!
//! [`summarize`] is the single source of truth for a job's counts.
//! [`merge`] reconciles it with counters stored by older releases.

use std::collections::{BTreeMap, HashMap};

use crate::domain::{
    Issue, JobResult, LegacySeverityFields, MetricStatistics, Severity, SeverityCounts,
    SeveritySummary,
};

/// Count issues per tier.
pub fn summarize(issues: &[Issue]) -> SeveritySummary {
    let mut counts = SeverityCounts::default();
    for issue in issues {
        counts.add(issue.severity, 1);
    }
    SeveritySummary::from(counts)
}

/// Count raw severity labels, normalizing legacy names before counting.
pub fn summarize_labels<'a>(labels: impl IntoIterator<Item = Option<&'a str>>) -> SeverityCounts {
    let mut counts = SeverityCounts::default();
    for label in labels {
        counts.add(Severity::normalize(label), 1);
    }
    counts
}

/// Fold a label-keyed count map into tiers. Legacy keys add to their tier.
pub fn counts_from_labels(map: &BTreeMap<String, u64>) -> SeverityCounts {
    let mut counts = SeverityCounts::default();
    for (label, n) in map {
        counts.add(Severity::normalize(Some(label.as_str())), *n);
    }
    counts
}

impl From<SeveritySummary> for SeverityCounts {
    fn from(summary: SeveritySummary) -> Self {
        summary.counts
    }
}

impl From<&LegacySeverityFields> for SeverityCounts {
    fn from(legacy: &LegacySeverityFields) -> Self {
        let scalars = SeverityCounts::new(
            legacy.critical_issues.unwrap_or(0),
            legacy.non_critical_issues.unwrap_or(0),
            0,
        );
        match &legacy.severity_counts {
            Some(map) => scalars.max(counts_from_labels(map)),
            None => scalars,
        }
    }
}

/// Reconcile independently sourced counts by taking the elementwise maximum
/// per tier.
///
/// This exists for documents that carry legacy scalar counters next to the
/// structured summary. Once those are gone, `summarize` alone suffices and
/// this shim can be removed.
pub fn merge<I, C>(sources: I) -> SeveritySummary
where
    I: IntoIterator<Item = C>,
    C: Into<SeverityCounts>,
{
    let counts = sources
        .into_iter()
        .map(Into::into)
        .fold(SeverityCounts::default(), SeverityCounts::max);
    SeveritySummary::from(counts)
}

/// The externally visible summary of a stored result: the stored summary,
/// any legacy counters, and a fresh count of the issue list, merged.
pub fn reconcile(result: &JobResult) -> SeveritySummary {
    let mut sources = vec![summarize(&result.issues).counts];
    if let Some(stored) = result.severity_summary {
        sources.push(stored.counts);
    }
    if !result.legacy.is_empty() {
        sources.push(SeverityCounts::from(&result.legacy));
    }
    merge(sources)
}

/// Accumulates min/max/average per `(source_id, metric_key)`.
#[derive(Debug, Default)]
pub struct StatisticsAccumulator {
    order: Vec<(String, String)>,
    entries: HashMap<(String, String), Running>,
}

#[derive(Debug, Clone, Copy)]
struct Running {
    min: f64,
    max: f64,
    sum: f64,
    count: u64,
}

impl StatisticsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample. Non-finite values are ignored.
    pub fn record(&mut self, source_id: &str, metric_key: &str, value: f64) {
        if !value.is_finite() {
            return;
        }
        let key = (source_id.to_string(), metric_key.to_string());
        match self.entries.get_mut(&key) {
            Some(running) => {
                running.min = running.min.min(value);
                running.max = running.max.max(value);
                running.sum += value;
                running.count += 1;
            }
            None => {
                self.order.push(key.clone());
                self.entries.insert(
                    key,
                    Running {
                        min: value,
                        max: value,
                        sum: value,
                        count: 1,
                    },
                );
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Statistics in first-seen order.
    pub fn finish(self) -> Vec<MetricStatistics> {
        let Self { order, entries } = self;
        order
            .into_iter()
            .filter_map(|key| {
                let running = entries.get(&key)?;
                let (source_id, metric_key) = key;
                Some(MetricStatistics {
                    source_id,
                    metric_key,
                    min: running.min,
                    max: running.max,
                    average: running.sum / running.count as f64,
                    count: running.count,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OverallSeverity, SourceKind};
    use proptest::prelude::*;

    fn issue(severity: Severity) -> Issue {
        Issue::new(SourceKind::Detector, "blackdetect", "Black frames", severity)
    }

    #[test]
    fn test_summarize_counts_per_tier() {
        let issues = vec![
            issue(Severity::Critical),
            issue(Severity::NonCritical),
            issue(Severity::NonCritical),
            issue(Severity::Informational),
        ];
        let summary = summarize(&issues);
        assert_eq!(summary.counts, SeverityCounts::new(1, 2, 1));
        assert_eq!(summary.overall, OverallSeverity::Critical);
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn test_summarize_empty_is_clear() {
        let summary = summarize(&[]);
        assert_eq!(summary.counts, SeverityCounts::default());
        assert_eq!(summary.overall, OverallSeverity::Clear);
    }

    #[test]
    fn test_summarize_labels_normalizes() {
        let counts = summarize_labels([Some("high"), Some("info"), None, Some("notice"), Some("x")]);
        assert_eq!(counts, SeverityCounts::new(1, 2, 2));
    }

    #[test]
    fn test_merge_example() {
        let merged = merge([
            SeverityCounts::new(2, 0, 0),
            SeverityCounts::new(0, 3, 0),
            SeverityCounts::new(2, 1, 0),
        ]);
        assert_eq!(merged.counts, SeverityCounts::new(2, 3, 0));
        assert_eq!(merged.overall, OverallSeverity::Critical);
    }

    #[test]
    fn test_merge_with_legacy_fields() {
        let mut map = BTreeMap::new();
        map.insert("high".to_string(), 1);
        map.insert("critical".to_string(), 1);
        map.insert("info".to_string(), 4);
        let legacy = LegacySeverityFields {
            critical_issues: Some(1),
            non_critical_issues: Some(5),
            severity_counts: Some(map),
        };
        let recomputed = summarize(&[issue(Severity::NonCritical)]);

        let merged = merge([SeverityCounts::from(&legacy), recomputed.into()]);
        assert_eq!(merged.counts, SeverityCounts::new(2, 5, 4));
    }

    #[test]
    fn test_reconcile_legacy_document() {
        let json = r#"{
            "issues": [{
                "source_kind": "detector",
                "source_id": "blackdetect",
                "event": "Black frames",
                "start_time": 0.0,
                "end_time": 2.0,
                "duration": 2.0,
                "severity": "info"
            }],
            "critical_issues": 2,
            "non_critical_issues": 0
        }"#;
        let result: JobResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.legacy.critical_issues, Some(2));

        let summary = reconcile(&result);
        assert_eq!(summary.counts, SeverityCounts::new(2, 0, 1));
        assert_eq!(summary.overall, OverallSeverity::Critical);
    }

    #[test]
    fn test_merge_of_nothing_is_clear() {
        let merged = merge(Vec::<SeverityCounts>::new());
        assert_eq!(merged.overall, OverallSeverity::Clear);
    }

    #[test]
    fn test_statistics_accumulator() {
        let mut acc = StatisticsAccumulator::new();
        acc.record("signalstats", "lavfi.signalstats.YAVG", 100.0);
        acc.record("astats", "lavfi.astats.Overall.Peak_level", -3.0);
        acc.record("signalstats", "lavfi.signalstats.YAVG", 200.0);
        acc.record("signalstats", "lavfi.signalstats.YAVG", f64::NAN);

        let stats = acc.finish();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].metric_key, "lavfi.signalstats.YAVG");
        assert_eq!(stats[0].min, 100.0);
        assert_eq!(stats[0].max, 200.0);
        assert_eq!(stats[0].average, 150.0);
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[1].source_id, "astats");
    }

    fn counts_strategy() -> impl Strategy<Value = SeverityCounts> {
        (0u64..50, 0u64..50, 0u64..50).prop_map(|(c, n, i)| SeverityCounts::new(c, n, i))
    }

    fn severity_strategy() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Critical),
            Just(Severity::NonCritical),
            Just(Severity::Informational),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_merge_is_idempotent(a in counts_strategy(), b in counts_strategy()) {
            let ab = merge([a, b]);
            prop_assert_eq!(merge([ab.counts, b]), ab);
        }

        #[test]
        fn prop_merge_is_commutative_and_associative(
            a in counts_strategy(),
            b in counts_strategy(),
            c in counts_strategy(),
        ) {
            prop_assert_eq!(merge([a, b]), merge([b, a]));
            let left = merge([merge([a, b]).counts, c]);
            let right = merge([a, merge([b, c]).counts]);
            prop_assert_eq!(left, right);
        }

        #[test]
        fn prop_merge_never_under_reports(a in counts_strategy(), b in counts_strategy()) {
            let merged = merge([a, b]).counts;
            for tier in Severity::ALL {
                prop_assert!(merged.get(tier) >= a.get(tier));
                prop_assert!(merged.get(tier) >= b.get(tier));
            }
        }

        #[test]
        fn prop_overall_ignores_issue_order(
            severities in prop::collection::vec(severity_strategy(), 0..40),
            seed in any::<u64>(),
        ) {
            let issues: Vec<Issue> = severities.iter().copied().map(issue).collect();
            let mut shuffled = issues.clone();
            // Deterministic rotation + reversal stands in for a shuffle.
            if !shuffled.is_empty() {
                let by = (seed as usize) % shuffled.len();
                shuffled.rotate_left(by);
            }
            if seed % 2 == 0 {
                shuffled.reverse();
            }
            prop_assert_eq!(summarize(&issues), summarize(&shuffled));
        }
    }
}
