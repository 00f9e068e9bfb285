//! Domain layer: value objects and records shared by every other module.

pub mod bounds;
pub mod issue;
pub mod job;
pub mod preset;
pub mod severity;
pub mod summary;

pub use bounds::{Bound, BoundSide, SeverityBounds};
pub use issue::{Issue, MatchedBound, SourceKind};
pub use job::{Job, JobResult, JobStatus, PresetSnapshot, TransitionOutcome};
pub use preset::{
    DetectorConfig, FilterConfig, MetricThresholds, Preset, PresetParameters, PresetWarning,
    TrackSelection,
};
pub use severity::{OverallSeverity, Severity};
pub use summary::{LegacySeverityFields, MetricStatistics, SeverityCounts, SeveritySummary};
