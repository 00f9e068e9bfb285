//! Worker pool pulling jobs from the backlog.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::orchestrator::Orchestrator;

/// Error stored on jobs that exceed the job timeout.
pub const JOB_TIMED_OUT: &str = "Job timed out";

/// Error stored on jobs cut short by a pool shutdown.
pub const INTERRUPTED_BY_SHUTDOWN: &str = "interrupted by shutdown";

/// Configuration for a worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Maximum concurrent workers.
    pub max_workers: usize,
    /// Job timeout in seconds.
    ///
    /// The detector run is dropped when it expires, which kills the
    /// detector process.
    pub job_timeout_secs: u64,
    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            job_timeout_secs: 3600, // 1 hour
            poll_interval_ms: 500,
        }
    }
}

/// A pool of workers that claim and execute jobs.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Workers currently executing a job.
    active_workers: Arc<AtomicUsize>,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::with_config(WorkerPoolConfig::default())
    }

    pub fn with_config(config: WorkerPoolConfig) -> Self {
        let max_workers = config.max_workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            config: WorkerPoolConfig {
                max_workers,
                ..config
            },
            active_workers: Arc::new(AtomicUsize::new(0)),
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Start the workers.
    pub fn start(&self, orchestrator: Arc<Orchestrator>) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let job_timeout = Duration::from_secs(self.config.job_timeout_secs);

        info!(
            "Starting worker pool with {} max workers",
            self.config.max_workers
        );

        let mut tasks = self.tasks.lock();
        let Some(join_set) = tasks.as_mut() else {
            warn!("Worker pool already stopped");
            return;
        };

        for i in 0..self.config.max_workers {
            let semaphore = self.semaphore.clone();
            let cancellation_token = self.cancellation_token.clone();
            let orchestrator = orchestrator.clone();
            let active_workers = self.active_workers.clone();
            let notifier = orchestrator.queue().notifier();

            join_set.spawn(async move {
                debug!("Worker {} started", i);

                loop {
                    if cancellation_token.is_cancelled() {
                        break;
                    }

                    let permit = match semaphore.clone().try_acquire_owned() {
                        Ok(p) => p,
                        Err(_) => {
                            tokio::select! {
                                _ = cancellation_token.cancelled() => break,
                                _ = tokio::time::sleep(poll_interval) => continue,
                            }
                        }
                    };

                    let job = match orchestrator.claim_next().await {
                        Ok(Some(job)) => job,
                        Ok(None) => {
                            drop(permit);
                            // Wait for a job or timeout
                            tokio::select! {
                                _ = cancellation_token.cancelled() => break,
                                _ = notifier.notified() => {}
                                _ = tokio::time::sleep(poll_interval) => {}
                            }
                            continue;
                        }
                        Err(e) => {
                            error!("Error claiming job: {}", e);
                            drop(permit);
                            tokio::time::sleep(poll_interval).await;
                            continue;
                        }
                    };

                    active_workers.fetch_add(1, Ordering::SeqCst);
                    debug!(job_id = %job.id, "Worker {} processing job", i);

                    let outcome = tokio::select! {
                        _ = cancellation_token.cancelled() => {
                            orchestrator.fail(&job.id, INTERRUPTED_BY_SHUTDOWN).await
                        }
                        result = tokio::time::timeout(job_timeout, orchestrator.execute(&job)) => {
                            match result {
                                Ok(outcome) => outcome,
                                Err(_) => {
                                    warn!(job_id = %job.id, "Job exceeded {:?}", job_timeout);
                                    orchestrator.fail(&job.id, JOB_TIMED_OUT).await
                                }
                            }
                        }
                    };
                    if let Err(e) = outcome {
                        error!(job_id = %job.id, "Failed to finalize job: {}", e);
                    }

                    active_workers.fetch_sub(1, Ordering::SeqCst);
                    drop(permit);
                }

                debug!("Worker {} shutting down", i);
            });
        }
    }

    /// Stop the pool and wait for every worker to exit.
    pub async fn stop(&self) {
        info!("Stopping worker pool");
        self.cancellation_token.cancel();

        // Take the join set out of the mutex before awaiting
        let join_set = {
            let mut tasks = self.tasks.lock();
            tasks.take()
        };

        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }

        info!("Worker pool stopped");
    }

    /// Number of workers currently executing a job.
    pub fn active_count(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }
}
