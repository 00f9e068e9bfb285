use std::sync::Arc;

use tracing::debug;

use super::job_queue::JobQueue;

/// Handle given to detector runners for advisory progress updates.
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: String,
    queue: Option<Arc<JobQueue>>,
}

impl ProgressReporter {
    pub fn new(job_id: impl Into<String>, queue: Arc<JobQueue>) -> Self {
        Self {
            job_id: job_id.into(),
            queue: Some(queue),
        }
    }

    /// A reporter that drops every update.
    pub fn noop(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            queue: None,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Report progress. Failures are logged and otherwise ignored.
    pub fn report(&self, percent: f64, current_test: Option<&str>) {
        let Some(queue) = &self.queue else {
            return;
        };
        if let Err(e) = queue.report_progress(&self.job_id, percent, current_test) {
            debug!(job_id = %self.job_id, error = %e, "Dropping progress update");
        }
    }
}
