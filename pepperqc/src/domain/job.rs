//! Job record and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::issue::Issue;
use super::preset::{Preset, PresetParameters};
use super::summary::{LegacySeverityFields, MetricStatistics, SeveritySummary};
use crate::evaluation::reconcile;
use crate::{Error, Result};

/// Job status.
///
/// `Queued -> Processing -> Success | Failure`. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Success,
    Failure,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "QUEUED" => Some(Self::Queued),
            "PROCESSING" => Some(Self::Processing),
            "SUCCESS" => Some(Self::Success),
            "FAILURE" => Some(Self::Failure),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Processing, Self::Success)
                | (Self::Processing, Self::Failure)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a transition request changed the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// The job was already in the requested terminal state.
    AlreadyApplied,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Deep copy of a preset taken at submission. Never refreshed from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetSnapshot {
    pub preset_id: String,
    pub preset_name: String,
    pub parameters: PresetParameters,
    pub captured_at: DateTime<Utc>,
}

impl PresetSnapshot {
    pub fn capture(preset: &Preset) -> Self {
        Self {
            preset_id: preset.id.clone(),
            preset_name: preset.name.clone(),
            parameters: preset.parameters.clone(),
            captured_at: Utc::now(),
        }
    }
}

/// Outcome of a job run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_summary: Option<SeveritySummary>,
    #[serde(default)]
    pub file_info: Value,
    #[serde(default)]
    pub statistics: Vec<MetricStatistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Counters carried over from documents written by older releases.
    #[serde(flatten)]
    pub legacy: LegacySeverityFields,
}

impl JobResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// One tracked submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub filename: String,
    pub file_path: PathBuf,
    pub status: JobStatus,
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_test: Option<String>,
    pub snapshot: PresetSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a queued job against a snapshot of `preset`.
    pub fn new(file_path: impl AsRef<Path>, preset: &Preset) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.to_string_lossy().into_owned());
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filename,
            file_path,
            status: JobStatus::Queued,
            percent: 0,
            current_test: None,
            snapshot: PresetSnapshot::capture(preset),
            result: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `QUEUED -> PROCESSING`.
    pub fn start(&mut self) -> Result<()> {
        self.transition(JobStatus::Processing)?;
        self.started_at = Some(self.updated_at);
        self.percent = 0;
        Ok(())
    }

    /// Apply advisory progress. Returns whether anything changed.
    ///
    /// Ignored outside `PROCESSING`. Percent never decreases and is capped
    /// at 100.
    pub fn apply_progress(&mut self, percent: f64, current_test: Option<&str>) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        let mut changed = false;
        if percent.is_finite() {
            let clamped = percent.clamp(0.0, 100.0).floor() as u8;
            if clamped > self.percent {
                self.percent = clamped;
                changed = true;
            }
        }
        if let Some(label) = current_test
            && self.current_test.as_deref() != Some(label)
        {
            self.current_test = Some(label.to_string());
            changed = true;
        }
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }

    /// `PROCESSING -> SUCCESS`. A summary is always present on success and
    /// never reports fewer issues per tier than the issue list holds.
    pub fn succeed(&mut self, mut result: JobResult) -> Result<TransitionOutcome> {
        if self.status == JobStatus::Success {
            return Ok(TransitionOutcome::AlreadyApplied);
        }
        self.transition(JobStatus::Success)?;
        result.severity_summary = Some(reconcile(&result));
        result.error = None;
        self.percent = 100;
        self.current_test = None;
        self.completed_at = Some(self.updated_at);
        self.result = Some(result);
        Ok(TransitionOutcome::Applied)
    }

    /// `PROCESSING -> FAILURE`. Partial issues may be attached.
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        partial: Option<JobResult>,
    ) -> Result<TransitionOutcome> {
        if self.status == JobStatus::Failure {
            return Ok(TransitionOutcome::AlreadyApplied);
        }
        self.transition(JobStatus::Failure)?;
        let mut result = partial.unwrap_or_default();
        if !result.issues.is_empty()
            || result.severity_summary.is_some()
            || !result.legacy.is_empty()
        {
            result.severity_summary = Some(reconcile(&result));
        }
        result.error = Some(error.into());
        self.current_test = None;
        self.completed_at = Some(self.updated_at);
        self.result = Some(result);
        Ok(TransitionOutcome::Applied)
    }

    /// Externally visible severity, once the job has a summary.
    pub fn severity_summary(&self) -> Option<&SeveritySummary> {
        self.result.as_ref().and_then(|r| r.severity_summary.as_ref())
    }

    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.error.as_deref())
    }
}
