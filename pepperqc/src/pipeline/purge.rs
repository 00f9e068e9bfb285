//! Job purge service for automatic cleanup of old finished jobs.
//!
//! Runs in the background and deletes `SUCCESS`/`FAILURE` jobs once they
//! have exceeded the configured retention period.

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::job_queue::JobQueue;
use crate::Result;

/// Configuration for job purging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeConfig {
    /// Number of days to retain finished jobs.
    /// Set to 0 to retain all jobs indefinitely.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Interval between purge checks in seconds.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Also delete the media file of each purged job.
    #[serde(default)]
    pub remove_media: bool,
}

fn default_retention_days() -> u32 {
    7
}

fn default_check_interval_secs() -> u64 {
    3600 // 1 hour
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            check_interval_secs: default_check_interval_secs(),
            remove_media: false,
        }
    }
}

impl PurgeConfig {
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_remove_media(mut self, remove: bool) -> Self {
        self.remove_media = remove;
        self
    }
}

/// Result of one purge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub jobs: usize,
    pub media_files: usize,
}

/// Deletes expired jobs from the queue.
pub struct JobPurgeService {
    config: PurgeConfig,
    queue: Arc<JobQueue>,
}

impl JobPurgeService {
    pub fn new(config: PurgeConfig, queue: Arc<JobQueue>) -> Self {
        Self { config, queue }
    }

    /// Run a single purge pass.
    pub async fn run_purge(&self) -> Result<PurgeStats> {
        // Check if retention is disabled (0 = retain forever)
        if self.config.retention_days == 0 {
            debug!("Job purging disabled (retention_days = 0)");
            return Ok(PurgeStats::default());
        }

        let cutoff = Utc::now() - ChronoDuration::days(i64::from(self.config.retention_days));
        let expired: Vec<_> = self
            .queue
            .list_jobs()
            .into_iter()
            .filter(|job| job.is_terminal() && job.completed_at.unwrap_or(job.updated_at) < cutoff)
            .collect();

        let mut stats = PurgeStats::default();
        for job in expired {
            let job = match self.queue.delete_job(&job.id).await {
                Ok(job) => job,
                Err(e) => {
                    warn!(job_id = %job.id, "Failed to purge job: {}", e);
                    continue;
                }
            };
            stats.jobs += 1;

            if self.config.remove_media {
                if self.queue.references_path(&job.file_path) {
                    debug!(
                        path = %job.file_path.display(),
                        "Keeping media file still used by another job"
                    );
                    continue;
                }
                match tokio::fs::remove_file(&job.file_path).await {
                    Ok(()) => {
                        debug!(path = %job.file_path.display(), "Removed media file");
                        stats.media_files += 1;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(path = %job.file_path.display(), "Failed to remove media file: {}", e);
                    }
                }
            }
        }

        if stats.jobs > 0 {
            info!(
                "Purged {} old jobs (retention: {} days)",
                stats.jobs, self.config.retention_days
            );
        } else {
            debug!("No jobs to purge");
        }
        Ok(stats)
    }

    /// Start the background purge task.
    pub fn start_background_task(
        self: Arc<Self>,
        cancellation_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut check_interval =
                interval(Duration::from_secs(self.config.check_interval_secs.max(1)));

            info!(
                "Job purge service started (retention: {} days, interval: {}s)",
                self.config.retention_days, self.config.check_interval_secs
            );

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        info!("Job purge service shutting down");
                        break;
                    }
                    _ = check_interval.tick() => {
                        if let Err(e) = self.run_purge().await {
                            error!("Purge cycle failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, JobResult, JobStatus, Preset};
    use crate::pipeline::job_queue::JobQueueConfig;
    use crate::pipeline::store::{FsJobRepository, JobRepository};

    async fn finished_job(queue: &JobQueue, path: &std::path::Path) -> String {
        let job = Job::new(path, &Preset::builtin_default());
        let id = queue.enqueue(job).await.unwrap();
        queue.try_claim(&id).await.unwrap();
        queue.complete(&id, JobResult::default()).await.unwrap();
        id
    }

    #[test]
    fn test_purge_config_default() {
        let config = PurgeConfig::default();
        assert_eq!(config.retention_days, 7);
        assert!(!config.remove_media);
    }

    #[tokio::test]
    async fn test_purge_keeps_recent_and_unfinished_jobs() {
        let queue = Arc::new(JobQueue::new());
        let recent = finished_job(&queue, std::path::Path::new("/media/recent.mov")).await;
        let queued = queue
            .enqueue(Job::new("/media/queued.mov", &Preset::builtin_default()))
            .await
            .unwrap();

        let service = JobPurgeService::new(PurgeConfig::default(), queue.clone());
        let stats = service.run_purge().await.unwrap();
        assert_eq!(stats.jobs, 0);
        assert!(queue.get_job(&recent).is_some());
        assert_eq!(queue.get_job(&queued).unwrap().status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_purge_removes_expired_jobs_and_media() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("old.mov");
        tokio::fs::write(&media, b"data").await.unwrap();

        let repo: Arc<dyn JobRepository> =
            Arc::new(FsJobRepository::open(dir.path().join("jobs")).await.unwrap());
        let mut old = Job::new(&media, &Preset::builtin_default());
        old.start().unwrap();
        old.succeed(JobResult::default()).unwrap();
        old.completed_at = Some(Utc::now() - ChronoDuration::days(30));
        repo.save_job(&old).await.unwrap();

        let queue = Arc::new(JobQueue::with_repository(
            JobQueueConfig::default(),
            repo.clone(),
        ));
        queue.recover().await.unwrap();
        let fresh = finished_job(&queue, std::path::Path::new("/media/fresh.mov")).await;

        let disabled = JobPurgeService::new(
            PurgeConfig::default().with_retention_days(0),
            queue.clone(),
        );
        assert_eq!(disabled.run_purge().await.unwrap(), PurgeStats::default());

        let service = JobPurgeService::new(
            PurgeConfig::default().with_remove_media(true),
            queue.clone(),
        );
        let stats = service.run_purge().await.unwrap();
        assert_eq!(
            stats,
            PurgeStats {
                jobs: 1,
                media_files: 1
            }
        );
        assert!(queue.get_job(&old.id).is_none());
        assert!(queue.get_job(&fresh).is_some());
        assert!(!media.exists());
        assert_eq!(repo.load_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_purge_keeps_media_of_resubmitted_file() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("clip.mov");
        tokio::fs::write(&media, b"data").await.unwrap();

        let repo: Arc<dyn JobRepository> =
            Arc::new(FsJobRepository::open(dir.path().join("jobs")).await.unwrap());
        let mut old = Job::new(&media, &Preset::builtin_default());
        old.start().unwrap();
        old.fail("decoder crashed", None).unwrap();
        old.completed_at = Some(Utc::now() - ChronoDuration::days(30));
        repo.save_job(&old).await.unwrap();

        let queue = Arc::new(JobQueue::with_repository(
            JobQueueConfig::default(),
            repo.clone(),
        ));
        queue.recover().await.unwrap();
        let retry = queue
            .enqueue(Job::new(&media, &Preset::builtin_default()))
            .await
            .unwrap();

        let service = JobPurgeService::new(
            PurgeConfig::default().with_remove_media(true),
            queue.clone(),
        );
        let stats = service.run_purge().await.unwrap();
        assert_eq!(
            stats,
            PurgeStats {
                jobs: 1,
                media_files: 0
            }
        );
        assert!(queue.get_job(&old.id).is_none());
        assert_eq!(queue.get_job(&retry).unwrap().status, JobStatus::Queued);
        assert!(media.exists());
    }
}
