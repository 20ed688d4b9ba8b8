//! Job executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use vmix_queue::{Delivery, JobQueue, QueueJob};

use crate::config::WorkerConfig;
use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::orchestrator::orchestrate;
use crate::steps::{abandon_step, run_cleanup, run_render, run_upload};

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    ctx: Arc<WorkerContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: Arc<JobQueue>, ctx: Arc<WorkerContext>) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue,
            ctx,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' on {:?} with {} max concurrent jobs",
            self.consumer_name, self.config.queues, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claim_task();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("Shutdown timeout reached with jobs still running");
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically claim jobs left pending by crashed workers or awaiting retry.
    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let ctx = Arc::clone(&self.ctx);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let classes = self.config.queues.clone();
        let interval = self.config.claim_interval;
        let min_idle_ms = self.config.claim_min_idle.as_millis() as u64;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        for class in &classes {
                            let deliveries = match queue.claim_pending(&consumer_name, *class, min_idle_ms, 5).await {
                                Ok(d) => d,
                                Err(e) => {
                                    warn!("Failed to claim pending {} jobs: {}", class, e);
                                    continue;
                                }
                            };
                            if !deliveries.is_empty() {
                                info!("Claimed {} pending {} jobs", deliveries.len(), class);
                            }
                            for delivery in deliveries {
                                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                    return;
                                };
                                let ctx = Arc::clone(&ctx);
                                let queue = Arc::clone(&queue);
                                tokio::spawn(async move {
                                    let _permit = permit;
                                    Self::execute_job(ctx, queue, delivery).await;
                                });
                            }
                        }
                    }
                }
            }
        })
    }

    /// Consume and process jobs from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .queue
            .consume(&self.consumer_name, &self.config.queues, 1000, available.min(5))
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", deliveries.len());

        for delivery in deliveries {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, delivery).await;
            });
        }

        Ok(())
    }

    /// Execute a single job with retry and DLQ handling.
    async fn execute_job(ctx: Arc<WorkerContext>, queue: Arc<JobQueue>, delivery: Delivery) {
        let logger = JobLogger::new(&delivery.job);
        let step = delivery.job.kind();
        let start = Instant::now();
        logger.log_start(&delivery.message_id);

        let result = process_job(&ctx, &delivery.job)
            .instrument(logger.create_span())
            .await;

        let e = match result {
            Ok(()) => {
                metrics::record_step_completed(step, start.elapsed().as_secs_f64());
                logger.log_completion(&format!("{:.2}s", start.elapsed().as_secs_f64()));
                if let Err(e) = queue.ack(delivery.class, &delivery.message_id).await {
                    logger.log_error(&format!("Failed to ack: {}", e));
                }
                return;
            }
            Err(e) => e,
        };

        let retryable = e.is_retryable() && should_retry(&delivery.job);
        metrics::record_step_failed(step, retryable);
        logger.log_error(&e.to_string());

        if retryable {
            let retry_count = queue.increment_retry(&delivery.message_id).await.unwrap_or(u32::MAX);
            let max_retries = queue.max_retries();
            if retry_count < max_retries {
                // Redelivered by the claim task once idle long enough
                logger.log_warning(&format!("will be retried (attempt {}/{})", retry_count, max_retries));
                return;
            }
            logger.log_warning(&format!("exceeded max retries ({}), moving to DLQ", max_retries));
        }

        // The chain must count as terminal before its job leaves the stream
        if let Err(abandon_err) = abandon_step(&ctx, &delivery.job).await {
            logger.log_error(&format!("Failed to mark chain failed: {}", abandon_err));
            return;
        }

        if let Err(dlq_err) = queue.dlq(&delivery, &e.to_string()).await {
            logger.log_error(&format!("Failed to move job to DLQ: {}", dlq_err));
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        let max = self.config.max_concurrent_jobs.max(1);
        while self.job_semaphore.available_permits() < max {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Orchestration dispatches its own cleanup on failure, so rerunning it
/// would race that cleanup.
fn should_retry(job: &QueueJob) -> bool {
    !matches!(job, QueueJob::Orchestrate(_))
}

/// Run one job to completion.
pub async fn process_job(ctx: &WorkerContext, job: &QueueJob) -> WorkerResult<()> {
    match job {
        QueueJob::Orchestrate(j) => {
            let summary = orchestrate(ctx, j).await?;
            info!(
                task_id = %summary.task_id,
                status = %summary.status,
                total_combinations = summary.total_combinations,
                "Orchestration finished"
            );
        }
        QueueJob::Render(j) => {
            run_render(ctx, j).await?;
        }
        QueueJob::Upload(j) => {
            run_upload(ctx, j).await?;
        }
        QueueJob::Cleanup(j) => run_cleanup(j).await,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vmix_models::TaskId;
    use vmix_queue::{CleanupJob, CleanupTrigger, OrchestrateJob};

    #[test]
    fn test_orchestration_is_never_retried() {
        let request = serde_json::from_value(serde_json::json!({
            "task_name": "launch",
            "video_blocks": {"block_1": ["https://cdn.test/a.mp4"]},
            "audio_blocks": {"m": ["https://cdn.test/x.mp3"]},
            "text_to_speech": [{"text": "hi", "voice": "Rachel"}]
        }))
        .unwrap();
        assert!(!should_retry(&QueueJob::Orchestrate(OrchestrateJob::new(request))));

        let cleanup = QueueJob::Cleanup(CleanupJob {
            task_id: TaskId::from_string("t"),
            work_dir: "/tmp/task_t".into(),
            started_at: Utc::now(),
            trigger: CleanupTrigger::FanIn,
        });
        assert!(should_retry(&cleanup));
    }
}
