//! Job persistence.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::Job;
use crate::{Error, Result};

/// Durable storage for job records.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert or replace a job.
    async fn save_job(&self, job: &Job) -> Result<()>;

    /// Delete a job. Deleting a missing job is not an error.
    async fn delete_job(&self, id: &str) -> Result<()>;

    /// Load every stored job, oldest first.
    async fn load_jobs(&self) -> Result<Vec<Job>>;
}

/// Stores one JSON document per job in a directory.
pub struct FsJobRepository {
    dir: PathBuf,
}

impl FsJobRepository {
    /// Open (and create if needed) a job store directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::validation(format!("Invalid job id '{}'", id)));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl JobRepository for FsJobRepository {
    async fn save_job(&self, job: &Job) -> Result<()> {
        let path = self.path_for(&job.id)?;
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(job)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(job_id = %job.id, status = %job.status, "Persisted job");
        Ok(())
    }

    async fn delete_job(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_jobs(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read stored job");
                    continue;
                }
            };
            match serde_json::from_slice::<Job>(&bytes) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping malformed stored job");
                }
            }
        }
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobStatus, Preset};

    #[tokio::test]
    async fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsJobRepository::open(dir.path().join("jobs")).await.unwrap();

        let mut job = Job::new("/tmp/a.mov", &Preset::builtin_default());
        repo.save_job(&job).await.unwrap();
        job.start().unwrap();
        repo.save_job(&job).await.unwrap();

        let loaded = repo.load_jobs().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, JobStatus::Processing);
        assert_eq!(loaded[0].snapshot, job.snapshot);

        repo.delete_job(&job.id).await.unwrap();
        repo.delete_job(&job.id).await.unwrap();
        assert!(repo.load_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_documents_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsJobRepository::open(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("broken.json"), b"{not json")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), b"ignored")
            .await
            .unwrap();
        let job = Job::new("/tmp/b.mov", &Preset::builtin_default());
        repo.save_job(&job).await.unwrap();

        let loaded = repo.load_jobs().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, job.id);
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsJobRepository::open(dir.path()).await.unwrap();
        assert!(matches!(
            repo.delete_job("../escape").await,
            Err(Error::Validation(_))
        ));
    }
}
