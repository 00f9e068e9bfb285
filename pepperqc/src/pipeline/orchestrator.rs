//! Job orchestrator.
//!
//! Front door for submissions and status queries. Resolves presets,
//! snapshots them into new jobs, runs claimed jobs through the detector
//! runner and the evaluator, and finalizes them on the queue.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::job_queue::JobQueue;
use super::progress::ProgressReporter;
use super::runner::DetectorRunner;
use crate::catalog::{PresetCatalog, PresetUpsert};
use crate::domain::{
    Issue, Job, JobResult, JobStatus, MetricStatistics, Preset, SeveritySummary,
    TransitionOutcome,
};
use crate::evaluation::{evaluate_findings, reconcile, summarize};
use crate::notification::JobLifecycleEvent;
use crate::{Error, Result};

/// Live status of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub filename: String,
    pub preset_name: String,
    pub status: JobStatus,
    pub percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_test: Option<String>,
    /// Reconciled summary; present once the job has a result to summarize.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_summary: Option<SeveritySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

/// Report data for a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub filename: String,
    pub preset_name: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_summary: Option<SeveritySummary>,
    /// Issues ordered by start time.
    pub issues: Vec<Issue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub file_info: Value,
    pub statistics: Vec<MetricStatistics>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Summary exposed for a job, if it has one.
///
/// Successful jobs always have one. Failed jobs only when issues were
/// computed before the failure.
fn visible_summary(job: &Job) -> Option<SeveritySummary> {
    let result = job.result.as_ref()?;
    let has_data = job.status == JobStatus::Success
        || result.severity_summary.is_some()
        || !result.issues.is_empty()
        || !result.legacy.is_empty();
    has_data.then(|| reconcile(result))
}

/// Coordinates the catalog, the job queue and the detector runner.
pub struct Orchestrator {
    catalog: Arc<dyn PresetCatalog>,
    queue: Arc<JobQueue>,
    runner: Arc<dyn DetectorRunner>,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<dyn PresetCatalog>,
        queue: Arc<JobQueue>,
        runner: Arc<dyn DetectorRunner>,
    ) -> Self {
        Self {
            catalog,
            queue,
            runner,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn catalog(&self) -> &Arc<dyn PresetCatalog> {
        &self.catalog
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobLifecycleEvent> {
        self.queue.subscribe()
    }

    /// Submit a file for analysis.
    ///
    /// Without a preset id the catalog default is used. The preset is
    /// copied into the job, so later catalog edits do not affect it.
    pub async fn submit(&self, file_path: impl AsRef<Path>, preset_id: Option<&str>) -> Result<String> {
        let preset = match preset_id {
            Some(id) => self
                .catalog
                .get_preset(id)
                .await?
                .ok_or_else(|| Error::not_found("Preset", id))?,
            None => self.catalog.resolve_default().await?,
        };
        let job = Job::new(file_path, &preset);
        self.queue.enqueue(job).await
    }

    /// Claim the oldest queued job.
    pub async fn claim_next(&self) -> Result<Option<Job>> {
        self.queue.claim_next().await
    }

    /// Claim a specific queued job. `Ok(None)` if another worker got it.
    pub async fn try_claim(&self, job_id: &str) -> Result<Option<Job>> {
        self.queue.try_claim(job_id).await
    }

    pub fn report_progress(
        &self,
        job_id: &str,
        percent: f64,
        current_test: Option<&str>,
    ) -> Result<bool> {
        self.queue.report_progress(job_id, percent, current_test)
    }

    pub async fn complete(&self, job_id: &str, result: JobResult) -> Result<TransitionOutcome> {
        self.queue.complete(job_id, result).await
    }

    pub async fn fail(&self, job_id: &str, error: &str) -> Result<TransitionOutcome> {
        self.queue.fail(job_id, error).await
    }

    /// Run a claimed job to its terminal state.
    ///
    /// Detector errors fail the job. The returned error is reserved for
    /// failures to record the outcome itself.
    pub async fn execute(&self, job: &Job) -> Result<TransitionOutcome> {
        let parameters = &job.snapshot.parameters;
        let reporter = ProgressReporter::new(&job.id, self.queue.clone());

        info!(
            job_id = %job.id,
            filename = %job.filename,
            runner = self.runner.name(),
            "Running detectors"
        );

        let run = match self.runner.run(&job.file_path, parameters, &reporter).await {
            Ok(run) => run,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Detector run failed");
                return self.queue.fail(&job.id, &e.to_string()).await;
            }
        };

        let evaluation = evaluate_findings(&run.findings, parameters);
        if !evaluation.skipped.is_empty() {
            info!(
                job_id = %job.id,
                skipped = evaluation.skipped.len(),
                "Some findings could not be classified"
            );
        }
        debug!(
            job_id = %job.id,
            findings = run.findings.len(),
            issues = evaluation.issues.len(),
            "Evaluated findings"
        );

        let result = JobResult {
            severity_summary: Some(summarize(&evaluation.issues)),
            issues: evaluation.issues,
            file_info: run.file_info,
            statistics: evaluation.statistics,
            ..JobResult::default()
        };
        self.queue.complete(&job.id, result).await
    }

    /// Claim and execute the next queued job, if any.
    pub async fn run_next(&self) -> Result<Option<String>> {
        let Some(job) = self.claim_next().await? else {
            return Ok(None);
        };
        self.execute(&job).await?;
        Ok(Some(job.id))
    }

    pub fn get_status(&self, job_id: &str) -> Result<JobStatusView> {
        let job = self
            .queue
            .get_job(job_id)
            .ok_or_else(|| Error::not_found("Job", job_id))?;
        Ok(JobStatusView {
            severity_summary: visible_summary(&job),
            job_id: job.id,
            filename: job.filename,
            preset_name: job.snapshot.preset_name,
            status: job.status,
            percent: job.percent,
            current_test: job.current_test,
            result: job.result,
        })
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        self.queue.list_jobs()
    }

    pub async fn delete_job(&self, job_id: &str) -> Result<Job> {
        self.queue.delete_job(job_id).await
    }

    /// Report data for a job in `SUCCESS` or `FAILURE`.
    pub fn report(&self, job_id: &str) -> Result<JobReport> {
        let job = self
            .queue
            .get_job(job_id)
            .ok_or_else(|| Error::not_found("Job", job_id))?;
        if !job.is_terminal() {
            return Err(Error::ReportUnavailable {
                job_id: job.id,
                status: job.status.to_string(),
            });
        }

        let severity_summary = visible_summary(&job);
        let result = job.result.unwrap_or_default();
        let mut issues = result.issues;
        issues.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

        Ok(JobReport {
            job_id: job.id,
            filename: job.filename,
            preset_name: job.snapshot.preset_name,
            status: job.status,
            severity_summary,
            issues,
            error: result.error,
            file_info: result.file_info,
            statistics: result.statistics,
            created_at: job.created_at,
            completed_at: job.completed_at,
        })
    }

    pub async fn list_presets(&self) -> Result<Vec<Preset>> {
        self.catalog.list_presets().await
    }

    pub async fn upsert_preset(&self, preset: Preset) -> Result<PresetUpsert> {
        self.catalog.upsert_preset(preset).await
    }

    /// Delete a preset no stored job was submitted against.
    pub async fn delete_preset(&self, preset_id: &str) -> Result<()> {
        let jobs = self.queue.count_jobs_for_preset(preset_id);
        if jobs > 0 {
            return Err(Error::PresetInUse {
                id: preset_id.to_string(),
                jobs,
            });
        }
        self.catalog.delete_preset(preset_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryPresetCatalog;
    use crate::domain::{DetectorConfig, PresetParameters, Severity};
    use crate::pipeline::runner::{DetectorRun, RawFinding};
    use async_trait::async_trait;

    struct FixedRunner(std::result::Result<Vec<RawFinding>, String>);

    #[async_trait]
    impl DetectorRunner for FixedRunner {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn run(
            &self,
            _file_path: &Path,
            _parameters: &PresetParameters,
            progress: &ProgressReporter,
        ) -> Result<DetectorRun> {
            progress.report(50.0, Some("blackdetect"));
            match &self.0 {
                Ok(findings) => Ok(DetectorRun {
                    findings: findings.clone(),
                    file_info: serde_json::json!({"format": "mov"}),
                }),
                Err(message) => Err(Error::detector(message.clone())),
            }
        }
    }

    fn orchestrator(
        catalog: InMemoryPresetCatalog,
        runner: FixedRunner,
    ) -> Orchestrator {
        Orchestrator::new(
            Arc::new(catalog),
            Arc::new(JobQueue::new()),
            Arc::new(runner),
        )
    }

    #[tokio::test]
    async fn test_submit_resolves_presets() {
        let orch = orchestrator(InMemoryPresetCatalog::with_builtin_default(), FixedRunner(Ok(vec![])));
        let id = orch.submit("/media/a.mov", None).await.unwrap();
        let status = orch.get_status(&id).unwrap();
        assert_eq!(status.status, JobStatus::Queued);
        assert_eq!(status.preset_name, "Default");
        assert!(status.severity_summary.is_none());

        assert!(matches!(
            orch.submit("/media/a.mov", Some("missing")).await,
            Err(Error::NotFound { .. })
        ));

        let empty = orchestrator(InMemoryPresetCatalog::new(), FixedRunner(Ok(vec![])));
        assert!(matches!(
            empty.submit("/media/a.mov", None).await,
            Err(Error::NoPresetAvailable)
        ));
    }

    #[tokio::test]
    async fn test_black_frame_scenario() {
        let preset = Preset::new(
            "Strict",
            PresetParameters::default().with_detector(
                DetectorConfig::new("blackdetect").with_default_severity(Severity::Critical),
            ),
        );
        let catalog = InMemoryPresetCatalog::with_presets(vec![preset.clone()]);
        let finding = RawFinding::event("blackdetect").with_span(3.0, 5.5);
        let orch = orchestrator(catalog, FixedRunner(Ok(vec![finding])));

        let id = orch.submit("/media/a.mov", Some(&preset.id)).await.unwrap();
        assert_eq!(orch.run_next().await.unwrap(), Some(id.clone()));

        let status = orch.get_status(&id).unwrap();
        assert_eq!(status.status, JobStatus::Success);
        assert_eq!(status.percent, 100);
        let summary = status.severity_summary.unwrap();
        assert_eq!(summary.counts.critical, 1);
        assert_eq!(summary.counts.non_critical, 0);
        assert_eq!(summary.overall, crate::domain::OverallSeverity::Critical);

        let report = orch.report(&id).unwrap();
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].severity, Severity::Critical);
        assert_eq!(report.file_info["format"], "mov");
    }

    #[tokio::test]
    async fn test_detector_error_fails_job() {
        let orch = orchestrator(
            InMemoryPresetCatalog::with_builtin_default(),
            FixedRunner(Err("ffprobe exited with status 1".to_string())),
        );
        let id = orch.submit("/media/broken.mov", None).await.unwrap();
        orch.run_next().await.unwrap();

        let status = orch.get_status(&id).unwrap();
        assert_eq!(status.status, JobStatus::Failure);
        assert!(status.severity_summary.is_none());
        let report = orch.report(&id).unwrap();
        assert_eq!(report.filename, "broken.mov");
        assert!(report.error.unwrap().contains("ffprobe exited with status 1"));
    }

    #[tokio::test]
    async fn test_report_requires_terminal_state() {
        let orch = orchestrator(InMemoryPresetCatalog::with_builtin_default(), FixedRunner(Ok(vec![])));
        let id = orch.submit("/media/a.mov", None).await.unwrap();
        assert!(matches!(
            orch.report(&id),
            Err(Error::ReportUnavailable { .. })
        ));
        orch.claim_next().await.unwrap();
        assert!(matches!(
            orch.report(&id),
            Err(Error::ReportUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_preset_in_use() {
        let catalog = InMemoryPresetCatalog::with_builtin_default();
        let orch = orchestrator(catalog, FixedRunner(Ok(vec![])));
        let preset = orch.catalog().resolve_default().await.unwrap();
        let id = orch.submit("/media/a.mov", None).await.unwrap();

        assert!(matches!(
            orch.delete_preset(&preset.id).await,
            Err(Error::PresetInUse { jobs: 1, .. })
        ));

        orch.delete_job(&id).await.unwrap();
        orch.delete_preset(&preset.id).await.unwrap();
        assert!(orch.list_presets().await.unwrap().is_empty());
    }
}
