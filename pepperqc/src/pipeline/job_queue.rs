//! Job queue.
//!
//! Holds every job record, the FIFO backlog of queued job ids, and the
//! lifecycle event broadcast. All state transitions go through here so that
//! claims are exactly-once and events for one job are published in
//! transition order.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, Notify, broadcast};
use tracing::{debug, error, info, trace, warn};

use super::store::JobRepository;
use crate::domain::{Job, JobResult, JobStatus, TransitionOutcome};
use crate::notification::JobLifecycleEvent;
use crate::{Error, Result};

/// Error stored on jobs found mid-run at startup.
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";

/// Configuration for the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobQueueConfig {
    /// Capacity of the lifecycle event broadcast channel.
    pub event_capacity: usize,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
        }
    }
}

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub queued: usize,
    pub processing: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// What [`JobQueue::recover`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub requeued: usize,
    pub interrupted: usize,
    pub terminal: usize,
}

/// The job queue service.
pub struct JobQueue {
    /// All known jobs by id.
    jobs: DashMap<String, Job>,
    /// Queued job ids in submission order.
    backlog: Mutex<VecDeque<String>>,
    /// Notify when new jobs are added.
    notify: Arc<Notify>,
    /// Lifecycle events.
    events: broadcast::Sender<JobLifecycleEvent>,
    /// Write-through persistence.
    repository: Option<Arc<dyn JobRepository>>,
    /// Serializes repository writes and deletes.
    persist_lock: AsyncMutex<()>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    /// Create a new in-memory job queue.
    pub fn new() -> Self {
        Self::with_config(JobQueueConfig::default())
    }

    /// Create a new job queue with custom configuration.
    pub fn with_config(config: JobQueueConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            jobs: DashMap::new(),
            backlog: Mutex::new(VecDeque::new()),
            notify: Arc::new(Notify::new()),
            events,
            repository: None,
            persist_lock: AsyncMutex::new(()),
        }
    }

    /// Create a new job queue that writes every transition through to
    /// `repository`.
    pub fn with_repository(config: JobQueueConfig, repository: Arc<dyn JobRepository>) -> Self {
        let mut queue = Self::with_config(config);
        queue.repository = Some(repository);
        queue
    }

    /// Notifier signalled whenever a job is queued.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobLifecycleEvent> {
        self.events.subscribe()
    }

    /// Number of jobs waiting to be claimed.
    pub fn depth(&self) -> usize {
        self.backlog.lock().len()
    }

    fn emit(&self, event: JobLifecycleEvent) {
        let kind = event.kind;
        if self.events.send(event).is_err() {
            trace!(%kind, "No lifecycle event subscribers");
        }
    }

    /// Write the job's current record through to the repository.
    ///
    /// Saves whatever the table holds at write time, so a late call never
    /// stores an older state or resurrects a deleted job.
    async fn persist(&self, job_id: &str) {
        let Some(repo) = &self.repository else {
            return;
        };
        let _guard = self.persist_lock.lock().await;
        let Some(job) = self.jobs.get(job_id).map(|job| job.clone()) else {
            debug!(job_id = %job_id, "Job deleted before it was persisted");
            return;
        };
        if let Err(e) = repo.save_job(&job).await {
            error!(job_id = %job_id, error = %e, "Failed to persist job");
        }
    }

    /// Enqueue a new job.
    pub async fn enqueue(&self, job: Job) -> Result<String> {
        if job.status != JobStatus::Queued {
            return Err(Error::validation(format!(
                "Only QUEUED jobs can be enqueued, job {} is {}",
                job.id, job.status
            )));
        }
        let job_id = job.id.clone();

        match self.jobs.entry(job_id.clone()) {
            Entry::Occupied(_) => {
                return Err(Error::validation(format!("Job {} already exists", job_id)));
            }
            Entry::Vacant(slot) => {
                self.emit(JobLifecycleEvent::submitted(&job));
                slot.insert(job.clone());
            }
        }

        self.persist(&job_id).await;
        self.backlog.lock().push_back(job_id.clone());

        info!(
            job_id = %job_id,
            filename = %job.filename,
            preset = %job.snapshot.preset_name,
            "Enqueued job"
        );

        self.notify.notify_one();
        Ok(job_id)
    }

    /// Claim the oldest queued job, moving it to `PROCESSING`.
    ///
    /// Returns `Ok(None)` when the backlog is empty. Each queued job is
    /// returned to exactly one caller.
    pub async fn claim_next(&self) -> Result<Option<Job>> {
        loop {
            let next = self.backlog.lock().pop_front();
            let Some(job_id) = next else {
                return Ok(None);
            };
            if let Some(job) = self.start_job(&job_id) {
                self.persist(&job.id).await;
                return Ok(Some(job));
            }
            trace!(job_id = %job_id, "Skipping stale backlog entry");
        }
    }

    /// Claim a specific job. Returns `Ok(None)` if it is no longer queued.
    pub async fn try_claim(&self, job_id: &str) -> Result<Option<Job>> {
        if !self.jobs.contains_key(job_id) {
            return Err(Error::not_found("Job", job_id));
        }
        let Some(job) = self.start_job(job_id) else {
            return Ok(None);
        };
        self.backlog.lock().retain(|id| id != job_id);
        self.persist(&job.id).await;
        Ok(Some(job))
    }

    /// Compare-and-swap `QUEUED -> PROCESSING` under the entry lock.
    fn start_job(&self, job_id: &str) -> Option<Job> {
        let mut entry = self.jobs.get_mut(job_id)?;
        if entry.status != JobStatus::Queued {
            return None;
        }
        if let Err(e) = entry.start() {
            warn!(job_id = %job_id, error = %e, "Failed to start job");
            return None;
        }
        self.emit(JobLifecycleEvent::started(&entry));
        let job = entry.clone();
        drop(entry);

        debug!(job_id = %job_id, "Claimed job");
        Some(job)
    }

    /// Record advisory progress. Returns whether anything changed.
    pub fn report_progress(
        &self,
        job_id: &str,
        percent: f64,
        current_test: Option<&str>,
    ) -> Result<bool> {
        let mut job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::not_found("Job", job_id))?;
        let changed = job.apply_progress(percent, current_test);
        if changed {
            debug!(
                job_id = %job_id,
                percent = job.percent,
                current_test = ?job.current_test,
                "Job progress"
            );
        }
        Ok(changed)
    }

    /// Mark a job as succeeded.
    ///
    /// Re-delivering success for an already succeeded job is a no-op.
    pub async fn complete(&self, job_id: &str, result: JobResult) -> Result<TransitionOutcome> {
        let (outcome, job) = {
            let mut entry = self
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| Error::not_found("Job", job_id))?;
            let outcome = entry.succeed(result)?;
            if outcome.is_applied() {
                self.emit(JobLifecycleEvent::succeeded(&entry));
            }
            (outcome, entry.clone())
        };

        if outcome.is_applied() {
            self.persist(&job.id).await;
            let overall = job.severity_summary().map(|s| s.overall).unwrap_or_default();
            info!(job_id = %job_id, %overall, "Job completed");
        } else {
            debug!(job_id = %job_id, "Ignoring duplicate completion");
        }
        Ok(outcome)
    }

    /// Mark a job as failed.
    pub async fn fail(&self, job_id: &str, error: &str) -> Result<TransitionOutcome> {
        self.fail_with_partial(job_id, error, None).await
    }

    /// Mark a job as failed, keeping any issues computed before the error.
    ///
    /// Re-delivering failure for an already failed job is a no-op.
    pub async fn fail_with_partial(
        &self,
        job_id: &str,
        error: &str,
        partial: Option<JobResult>,
    ) -> Result<TransitionOutcome> {
        let (outcome, job) = {
            let mut entry = self
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| Error::not_found("Job", job_id))?;
            let outcome = entry.fail(error, partial)?;
            if outcome.is_applied() {
                self.emit(JobLifecycleEvent::failed(&entry));
            }
            (outcome, entry.clone())
        };

        if outcome.is_applied() {
            self.persist(&job.id).await;
            warn!(job_id = %job_id, error = %error, "Job failed");
        } else {
            debug!(job_id = %job_id, "Ignoring duplicate failure");
        }
        Ok(outcome)
    }

    /// Get a job by ID.
    pub fn get_job(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|job| job.clone())
    }

    /// All jobs, oldest first.
    pub fn list_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|e| e.value().clone()).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }

    /// Number of stored jobs whose snapshot came from `preset_id`.
    pub fn count_jobs_for_preset(&self, preset_id: &str) -> usize {
        self.jobs
            .iter()
            .filter(|e| e.value().snapshot.preset_id == preset_id)
            .count()
    }

    /// Whether any stored job reads its media from `path`.
    pub fn references_path(&self, path: &Path) -> bool {
        self.jobs.iter().any(|e| e.value().file_path == path)
    }

    /// Delete a job record. An in-flight worker is not interrupted; its
    /// eventual completion is rejected as not found.
    pub async fn delete_job(&self, id: &str) -> Result<Job> {
        let (_, job) = self
            .jobs
            .remove(id)
            .ok_or_else(|| Error::not_found("Job", id))?;
        self.backlog.lock().retain(|queued| queued != id);

        if let Some(repo) = &self.repository {
            let _guard = self.persist_lock.lock().await;
            repo.delete_job(id).await?;
        }
        info!(job_id = %id, status = %job.status, "Deleted job");
        Ok(job)
    }

    /// Job counts by status.
    pub fn get_stats(&self) -> JobStats {
        let mut stats = JobStats::default();
        for entry in self.jobs.iter() {
            match entry.value().status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Success => stats.succeeded += 1,
                JobStatus::Failure => stats.failed += 1,
            }
        }
        stats
    }

    /// Reload jobs from the repository on startup.
    ///
    /// Queued jobs return to the backlog in submission order. Jobs that were
    /// mid-run are failed rather than re-queued.
    pub async fn recover(&self) -> Result<RecoveryStats> {
        let Some(repo) = &self.repository else {
            return Ok(RecoveryStats::default());
        };

        let mut stats = RecoveryStats::default();
        for mut job in repo.load_jobs().await? {
            match job.status {
                JobStatus::Queued => {
                    self.backlog.lock().push_back(job.id.clone());
                    self.jobs.insert(job.id.clone(), job);
                    stats.requeued += 1;
                }
                JobStatus::Processing => {
                    job.fail(INTERRUPTED_BY_RESTART, None)?;
                    self.emit(JobLifecycleEvent::failed(&job));
                    warn!(job_id = %job.id, "Failed job interrupted by restart");
                    let job_id = job.id.clone();
                    self.jobs.insert(job_id.clone(), job);
                    self.persist(&job_id).await;
                    stats.interrupted += 1;
                }
                JobStatus::Success | JobStatus::Failure => {
                    self.jobs.insert(job.id.clone(), job);
                    stats.terminal += 1;
                }
            }
        }

        info!(
            requeued = stats.requeued,
            interrupted = stats.interrupted,
            terminal = stats.terminal,
            "Recovered jobs"
        );
        if stats.requeued > 0 {
            self.notify.notify_waiters();
        }
        Ok(stats)
    }
}
