//! Job lifecycle events.
//!
//! Every successful state transition of a job produces one
//! [`JobLifecycleEvent`]. Events for a single job are published in
//! transition order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Job, OverallSeverity, SeveritySummary};

/// Priority level for notifications.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    /// Informational only.
    Low,
    #[default]
    Normal,
    High,
    /// Requires immediate attention.
    Critical,
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Which transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    /// Job created in `QUEUED`.
    Submitted,
    /// `QUEUED -> PROCESSING`.
    Started,
    /// `PROCESSING -> SUCCESS`.
    Succeeded,
    /// `PROCESSING -> FAILURE`.
    Failed,
}

impl JobEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Started => "started",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job state transition, as seen by notification consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLifecycleEvent {
    pub job_id: String,
    pub filename: String,
    pub preset_name: String,
    pub kind: JobEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_summary: Option<SeveritySummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobLifecycleEvent {
    fn from_job(job: &Job, kind: JobEventKind) -> Self {
        Self {
            job_id: job.id.clone(),
            filename: job.filename.clone(),
            preset_name: job.snapshot.preset_name.clone(),
            kind,
            severity_summary: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn submitted(job: &Job) -> Self {
        let mut event = Self::from_job(job, JobEventKind::Submitted);
        event.timestamp = job.created_at;
        event
    }

    pub fn started(job: &Job) -> Self {
        Self::from_job(job, JobEventKind::Started)
    }

    pub fn succeeded(job: &Job) -> Self {
        let mut event = Self::from_job(job, JobEventKind::Succeeded);
        event.severity_summary = job.severity_summary().copied();
        event
    }

    pub fn failed(job: &Job) -> Self {
        let mut event = Self::from_job(job, JobEventKind::Failed);
        event.severity_summary = job.severity_summary().copied();
        event.error = job.error().map(str::to_string);
        event
    }

    /// Canonical event type key, e.g. `job_succeeded`.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            JobEventKind::Submitted => "job_submitted",
            JobEventKind::Started => "job_started",
            JobEventKind::Succeeded => "job_succeeded",
            JobEventKind::Failed => "job_failed",
        }
    }

    pub fn priority(&self) -> NotificationPriority {
        match self.kind {
            JobEventKind::Submitted => NotificationPriority::Normal,
            JobEventKind::Started => NotificationPriority::Low,
            JobEventKind::Succeeded => match self.overall() {
                OverallSeverity::Critical => NotificationPriority::High,
                _ => NotificationPriority::Normal,
            },
            JobEventKind::Failed => NotificationPriority::High,
        }
    }

    pub fn overall(&self) -> OverallSeverity {
        self.severity_summary
            .map(|s| s.overall)
            .unwrap_or(OverallSeverity::Clear)
    }

    pub fn title(&self) -> String {
        match self.kind {
            JobEventKind::Submitted => "\u{1f4e5} PepperQC job submitted".to_string(), // 📥
            JobEventKind::Started => "\u{2699}\u{fe0f} PepperQC job started".to_string(), // ⚙️
            JobEventKind::Succeeded => "\u{2705} PepperQC job completed".to_string(), // ✅
            JobEventKind::Failed => "\u{26a0}\u{fe0f} PepperQC job failed".to_string(), // ⚠️
        }
    }

    /// Body lines following the title.
    pub fn description(&self) -> String {
        let when = format_timestamp(self.timestamp);
        let mut lines = vec![format!("File: {}", self.filename)];
        match self.kind {
            JobEventKind::Submitted => {
                lines.push(format!("Preset: {}", self.preset_name));
                lines.push(format!("Submitted: {when}"));
            }
            JobEventKind::Started => {
                lines.push(format!("Preset: {}", self.preset_name));
                lines.push(format!("Started: {when}"));
            }
            JobEventKind::Succeeded => {
                let summary = self.severity_summary.unwrap_or_default();
                lines.push(format!("Status: {}", summary.overall.label()));
                lines.push(format!("Total issues: {}", summary.total()));
                lines.push(format!(
                    "Breakdown: critical={}, non_critical={}, informational={}",
                    summary.counts.critical,
                    summary.counts.non_critical,
                    summary.counts.informational
                ));
                lines.push(format!("Completed: {when}"));
            }
            JobEventKind::Failed => {
                lines.push("Status: FAILURE".to_string());
                if let Some(error) = &self.error {
                    lines.push(format!("Error: {error}"));
                }
                lines.push(format!("Finished: {when}"));
            }
        }
        lines.join("\n")
    }

    /// Title and description as one plain-text message.
    pub fn message(&self) -> String {
        format!("{}\n{}", self.title(), self.description())
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobResult, Preset, SeverityCounts};

    fn processing_job() -> Job {
        let mut job = Job::new("/srv/media/promo.mxf", &Preset::builtin_default());
        job.start().unwrap();
        job
    }

    #[test]
    fn test_submitted_message() {
        let job = Job::new("/srv/media/promo.mxf", &Preset::builtin_default());
        let event = JobLifecycleEvent::submitted(&job);
        assert_eq!(event.kind, JobEventKind::Submitted);
        assert_eq!(event.timestamp, job.created_at);

        let message = event.message();
        assert!(message.contains("PepperQC job submitted"));
        assert!(message.contains("File: promo.mxf"));
        assert!(message.contains("Preset: Default"));
        assert!(message.contains(" UTC"));
    }

    #[test]
    fn test_succeeded_message_breakdown() {
        let mut job = processing_job();
        job.succeed(JobResult {
            severity_summary: Some(SeveritySummary::from(SeverityCounts::new(1, 2, 0))),
            ..JobResult::default()
        })
        .unwrap();

        let event = JobLifecycleEvent::succeeded(&job);
        assert_eq!(event.priority(), NotificationPriority::High);
        let description = event.description();
        assert!(description.contains("Status: Critical"));
        assert!(description.contains("Total issues: 3"));
        assert!(description.contains("Breakdown: critical=1, non_critical=2, informational=0"));
    }

    #[test]
    fn test_clear_success_is_normal_priority() {
        let mut job = processing_job();
        job.succeed(JobResult::default()).unwrap();
        let event = JobLifecycleEvent::succeeded(&job);
        assert_eq!(event.overall(), OverallSeverity::Clear);
        assert_eq!(event.priority(), NotificationPriority::Normal);
        assert!(event.description().contains("Status: Clear"));
    }

    #[test]
    fn test_failed_message_carries_error() {
        let mut job = processing_job();
        job.fail("detector exited with status 2", None).unwrap();
        let event = JobLifecycleEvent::failed(&job);
        assert_eq!(event.priority(), NotificationPriority::High);
        assert_eq!(event.error.as_deref(), Some("detector exited with status 2"));
        assert!(event.message().contains("Error: detector exited with status 2"));
        assert_eq!(event.event_type(), "job_failed");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(NotificationPriority::Critical > NotificationPriority::High);
        assert!(NotificationPriority::Normal > NotificationPriority::Low);
        assert_eq!(NotificationPriority::default(), NotificationPriority::Normal);
    }
}
