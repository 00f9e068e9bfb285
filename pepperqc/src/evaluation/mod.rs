//! Severity evaluation engine.
//!
//! - [`evaluator`] classifies raw findings against preset thresholds.
//! - [`aggregator`] rolls classified issues up into job-level summaries.

pub mod aggregator;
pub mod evaluator;

pub use aggregator::{
    StatisticsAccumulator, counts_from_labels, merge, reconcile, summarize, summarize_labels,
};
pub use evaluator::{
    Classification, Evaluation, Measurement, RawFinding, SkipReason, SkippedFinding,
    ThresholdEvaluator, classify, evaluate_findings,
};
