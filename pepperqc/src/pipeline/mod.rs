//! Job pipeline.
//!
//! The pipeline is responsible for:
//! - Holding the job backlog and enforcing exactly-once claims
//! - Running detectors for claimed jobs and recording the outcome
//! - Running a worker pool against the backlog
//! - Persisting jobs and purging old finished ones

mod job_queue;
mod orchestrator;
mod progress;
mod purge;
mod runner;
mod store;
mod worker_pool;

pub use job_queue::{
    INTERRUPTED_BY_RESTART, JobQueue, JobQueueConfig, JobStats, RecoveryStats,
};
pub use orchestrator::{JobReport, JobStatusView, Orchestrator};
pub use progress::ProgressReporter;
pub use purge::{JobPurgeService, PurgeConfig, PurgeStats};
pub use runner::{
    DetectorRun, DetectorRunner, ProcessDetectorConfig, ProcessDetectorRunner, RawFinding,
};
pub use store::{FsJobRepository, JobRepository};
pub use worker_pool::{INTERRUPTED_BY_SHUTDOWN, JOB_TIMED_OUT, WorkerPool, WorkerPoolConfig};
