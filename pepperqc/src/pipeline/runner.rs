//! Detector runners.
//!
//! A runner executes the external analysis tools for one file and returns
//! their raw findings. Classification happens afterwards, in the evaluator.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::progress::ProgressReporter;
use crate::domain::PresetParameters;
use crate::{Error, Result};

pub use crate::evaluation::RawFinding;

/// Maximum stderr bytes kept for error messages.
const STDERR_TAIL_BYTES: usize = 2048;

/// Everything a detector run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorRun {
    pub findings: Vec<RawFinding>,
    /// File and stream metadata reported by the tools.
    #[serde(default)]
    pub file_info: Value,
}

/// Executes detectors against a media file.
#[async_trait]
pub trait DetectorRunner: Send + Sync {
    /// Runner name for logs.
    fn name(&self) -> &'static str;

    /// Run every enabled filter and detector of `parameters` against
    /// `file_path`.
    async fn run(
        &self,
        file_path: &Path,
        parameters: &PresetParameters,
        progress: &ProgressReporter,
    ) -> Result<DetectorRun>;
}

/// Configuration for [`ProcessDetectorRunner`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDetectorConfig {
    /// Executable to spawn.
    pub command: String,
    /// Arguments placed before `--input <file>`.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for ProcessDetectorConfig {
    fn default() -> Self {
        Self {
            command: "pepperqc-detect".to_string(),
            args: Vec::new(),
        }
    }
}

/// One line of detector output.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DetectorMessage {
    Progress {
        #[serde(default)]
        percent: Option<f64>,
        #[serde(default)]
        label: Option<String>,
    },
    Finding(RawFinding),
    Metadata {
        #[serde(default)]
        file_info: Value,
    },
}

/// Runs an external detector process speaking JSON lines.
///
/// The preset snapshot is written to the child's stdin as JSON. The child
/// writes one JSON object per line to stdout: `progress`, `finding`, or
/// `metadata` messages. The child is killed if the run future is dropped.
pub struct ProcessDetectorRunner {
    config: ProcessDetectorConfig,
}

impl ProcessDetectorRunner {
    pub fn new(config: ProcessDetectorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DetectorRunner for ProcessDetectorRunner {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn run(
        &self,
        file_path: &Path,
        parameters: &PresetParameters,
        progress: &ProgressReporter,
    ) -> Result<DetectorRun> {
        let payload = serde_json::to_vec(parameters)?;

        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .arg("--input")
            .arg(file_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::detector(format!(
                    "Failed to spawn detector '{}': {}",
                    self.config.command, e
                ))
            })?;

        info!(
            job_id = %progress.job_id(),
            command = %self.config.command,
            file = %file_path.display(),
            "Started detector"
        );

        let stdin_task = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                match stdin.write_all(&payload).await {
                    Ok(()) => stdin.shutdown().await,
                    Err(e) => Err(e),
                }
            })
        });

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_tail(stderr, STDERR_TAIL_BYTES)));

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::detector("Detector stdout is not captured"))?;
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        let mut run = DetectorRun::default();

        // Raw bytes: a line that is not UTF-8 is skipped like any other
        // malformed line.
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = buf.trim_ascii();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<DetectorMessage>(line) {
                Ok(DetectorMessage::Progress { percent, label }) => {
                    progress.report(percent.unwrap_or(0.0), label.as_deref());
                }
                Ok(DetectorMessage::Finding(finding)) => run.findings.push(finding),
                Ok(DetectorMessage::Metadata { file_info }) => run.file_info = file_info,
                Err(e) => {
                    warn!(job_id = %progress.job_id(), error = %e, "Skipping malformed detector output line");
                }
            }
        }

        let status = child.wait().await?;

        if let Some(task) = stdin_task {
            match task.await {
                Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    warn!(job_id = %progress.job_id(), error = %e, "Failed to write preset to detector");
                }
                _ => {}
            }
        }
        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            let mut message = format!("Detector exited with {}", status);
            if !stderr_tail.is_empty() {
                message.push_str(": ");
                message.push_str(&stderr_tail);
            }
            return Err(Error::detector(message));
        }

        debug!(
            job_id = %progress.job_id(),
            findings = run.findings.len(),
            "Detector finished"
        );
        Ok(run)
    }
}

/// Drain `reader`, keeping only the last `limit` bytes.
async fn read_tail<R>(mut reader: R, limit: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let mut tail = Vec::with_capacity(limit);
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > limit {
                    let excess = tail.len() - limit;
                    tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).trim().to_string()
}

#[cfg(test)]
mod tail_tests {
    use super::*;

    #[tokio::test]
    async fn test_read_tail_keeps_last_bytes() {
        let mut log = Vec::new();
        for frame in 0..10_000 {
            log.extend_from_slice(format!("frame={frame} fps=25\n").as_bytes());
        }
        log.extend_from_slice(b"moov atom not found\n");

        let tail = read_tail(log.as_slice(), 64).await;
        assert!(tail.len() <= 64);
        assert!(tail.ends_with("moov atom not found"));
        assert!(!tail.contains("frame=0 "));

        assert_eq!(read_tail(&b"  short  "[..], 64).await, "short");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::{Job, JobStatus, Preset};
    use crate::pipeline::JobQueue;
    use std::sync::Arc;

    fn sh(script: &str) -> ProcessDetectorRunner {
        ProcessDetectorRunner::new(ProcessDetectorConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "detector".to_string()],
        })
    }

    #[tokio::test]
    async fn test_process_runner_parses_json_lines() {
        let script = r#"
            cat > /dev/null
            echo '{"type":"progress","percent":50,"label":"signalstats"}'
            echo 'not json'
            echo ''
            echo '{"type":"finding","source_id":"blackdetect","event_fired":true,"start_time":1.0,"end_time":2.0}'
            echo "{\"type\":\"finding\",\"source_id\":\"signalstats\",\"metric_key\":\"lavfi.signalstats.YAVG\",\"value\":240,\"details\":{\"input\":\"$2\"}}"
            echo '{"type":"metadata","file_info":{"format":"mov"}}'
        "#;
        let queue = Arc::new(JobQueue::new());
        let preset = Preset::builtin_default();
        let id = queue
            .enqueue(Job::new("/media/clip.mov", &preset))
            .await
            .unwrap();
        queue.claim_next().await.unwrap();
        let reporter = ProgressReporter::new(&id, queue.clone());

        let run = sh(script)
            .run(Path::new("/media/clip.mov"), &preset.parameters, &reporter)
            .await
            .unwrap();

        assert_eq!(run.findings.len(), 2);
        assert!(run.findings[0].event_fired);
        assert_eq!(run.findings[1].value, Some(240.0));
        assert_eq!(run.findings[1].details["input"], "/media/clip.mov");
        assert_eq!(run.file_info["format"], "mov");

        let job = queue.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.percent, 50);
        assert_eq!(job.current_test.as_deref(), Some("signalstats"));
    }

    #[tokio::test]
    async fn test_process_runner_reports_exit_failure() {
        let runner = sh("echo 'decoder exploded' >&2; exit 3");
        let err = runner
            .run(
                Path::new("/media/clip.mov"),
                &PresetParameters::builtin_default(),
                &ProgressReporter::noop("job"),
            )
            .await
            .unwrap_err();
        match err {
            Error::Detector(message) => assert!(message.contains("decoder exploded")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_process_runner_skips_undecodable_lines() {
        let script = r#"
            cat > /dev/null
            printf '\377\376 garbage\n'
            echo '{"type":"finding","source_id":"blackdetect","event_fired":true,"start_time":3.0}'
        "#;
        let run = sh(script)
            .run(
                Path::new("/media/clip.mov"),
                &PresetParameters::builtin_default(),
                &ProgressReporter::noop("job"),
            )
            .await
            .unwrap();

        assert_eq!(run.findings.len(), 1);
        assert_eq!(run.findings[0].source_id, "blackdetect");
        assert_eq!(run.findings[0].start_time, 3.0);
    }

    #[tokio::test]
    async fn test_process_runner_missing_binary() {
        let runner = ProcessDetectorRunner::new(ProcessDetectorConfig {
            command: "/nonexistent/pepperqc-detect".to_string(),
            args: Vec::new(),
        });
        let err = runner
            .run(
                Path::new("/media/clip.mov"),
                &PresetParameters::default(),
                &ProgressReporter::noop("job"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Detector(_)));
    }
}
