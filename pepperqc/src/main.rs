use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use pepperqc::catalog::InMemoryPresetCatalog;
use pepperqc::config::AppConfig;
use pepperqc::logging::init_logging;
use pepperqc::notification::{NotificationService, TelegramChannel};
use pepperqc::pipeline::{
    FsJobRepository, JobPurgeService, JobQueue, Orchestrator, ProcessDetectorRunner, WorkerPool,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_logging(&config.log_filter, config.log_json)?;

    let queue = match &config.job_store_dir {
        Some(dir) => {
            let repository = Arc::new(FsJobRepository::open(dir).await?);
            info!(dir = %dir.display(), "Using job store");
            Arc::new(JobQueue::with_repository(config.queue.clone(), repository))
        }
        None => Arc::new(JobQueue::with_config(config.queue.clone())),
    };

    let notifications = Arc::new(NotificationService::with_config(
        config.notification.clone(),
    ));
    for telegram in &config.telegram {
        notifications.add_channel(Arc::new(TelegramChannel::new(telegram.clone())));
    }
    // Subscribe before recovery so interrupted jobs are reported.
    notifications.start(queue.subscribe());
    queue.recover().await?;

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(InMemoryPresetCatalog::with_builtin_default()),
        queue.clone(),
        Arc::new(ProcessDetectorRunner::new(config.detector.clone())),
    ));

    let pool = WorkerPool::with_config(config.worker_pool.clone());
    pool.start(orchestrator.clone());

    let shutdown = CancellationToken::new();
    let purge = (config.purge.retention_days > 0).then(|| {
        Arc::new(JobPurgeService::new(config.purge.clone(), queue.clone()))
            .start_background_task(shutdown.clone())
    });

    for file in std::env::args().skip(1) {
        match orchestrator.submit(&file, None).await {
            Ok(job_id) => info!(job_id = %job_id, file = %file, "Submitted"),
            Err(e) => error!(file = %file, "Failed to submit: {}", e),
        }
    }

    info!("PepperQC running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    pool.stop().await;
    shutdown.cancel();
    if let Some(handle) = purge {
        let _ = handle.await;
    }
    notifications.stop().await;

    let stats = queue.get_stats();
    info!(
        queued = stats.queued,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "PepperQC stopped"
    );
    Ok(())
}
