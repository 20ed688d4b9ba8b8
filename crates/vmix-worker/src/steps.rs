//! Render, upload and cleanup steps of a task's job graph.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use vmix_media::fs_utils::{remove_dir_if_exists, remove_file_if_exists};
use vmix_media::RenderSpec;
use vmix_models::{ChainState, TaskPhase};
use vmix_queue::{finish_chain, CleanupJob, CleanupTrigger, QueueError, QueueJob, RenderJob, UploadJob};
use vmix_storage::{variant_key, VARIANT_CONTENT_TYPE};

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Encode one combination, then hand the chain over to its upload step.
pub async fn run_render(ctx: &WorkerContext, job: &RenderJob) -> WorkerResult<PathBuf> {
    let params = &job.params;
    debug!(task_id = %job.task_id, index = params.index, state = %ChainState::Rendering, "Rendering");

    let spec = RenderSpec {
        videos: params.videos.clone(),
        music: params.audio.clone(),
        voiceover: params.voiceover.clone(),
        index: params.index,
        total: params.total,
        output_dir: job.work_dir.join("results"),
    };
    let output = ctx.encoder.encode(&spec).await.map_err(WorkerError::Render)?;

    match ctx.backend.enqueue(QueueJob::Upload(job.upload(output.clone()))).await {
        // a redelivered render finds its upload already queued
        Ok(_) | Err(QueueError::Duplicate(_)) => {}
        Err(e) => return Err(e.into()),
    }

    debug!(task_id = %job.task_id, index = params.index, state = %ChainState::Uploading, "Upload queued");
    Ok(output)
}

/// Upload a rendered file, mark the chain done, then delete it locally.
///
/// The file is kept until the barrier has the report, so a retried upload
/// can put it again. A failed upload leaves it in place for cleanup.
pub async fn run_upload(ctx: &WorkerContext, job: &UploadJob) -> WorkerResult<String> {
    let start = Instant::now();
    let key = variant_key(&job.task_name, job.index);

    let stored = ctx
        .store
        .put_file(&job.local_path, &key, VARIANT_CONTENT_TYPE)
        .await?;
    info!(
        task_id = %job.task_id,
        index = job.index,
        key = %stored,
        "Uploaded in {:.2}s",
        start.elapsed().as_secs_f64()
    );

    finish_chain(ctx.backend.as_ref(), &job.task_id, job.index, ChainState::Done).await?;
    metrics::record_chain(ChainState::Done.as_str());

    if let Err(e) = remove_file_if_exists(&job.local_path).await {
        warn!(path = %job.local_path.display(), "Failed to delete uploaded file: {}", e);
    }

    Ok(stored)
}

/// Remove the task directory. Never fails.
pub async fn run_cleanup(job: &CleanupJob) {
    let elapsed = (Utc::now() - job.started_at).num_milliseconds() as f64 / 1000.0;
    let trigger = match job.trigger {
        CleanupTrigger::FanIn => "fan_in",
        CleanupTrigger::SetupFailure => "setup_failure",
    };

    match remove_dir_if_exists(&job.work_dir).await {
        Ok(true) => info!(
            task_id = %job.task_id,
            trigger,
            phase = %TaskPhase::CleanedUp,
            "Task finished in {:.2}s, removed {}",
            elapsed,
            job.work_dir.display()
        ),
        Ok(false) => info!(
            task_id = %job.task_id,
            trigger,
            phase = %TaskPhase::CleanedUp,
            "Task finished in {:.2}s, nothing to remove",
            elapsed
        ),
        Err(e) => warn!(
            task_id = %job.task_id,
            "Failed to remove {}: {}",
            job.work_dir.display(),
            e
        ),
    }

    metrics::record_cleanup(trigger);
}

/// Count a chain whose step gave up as failed, so the barrier can still release.
pub async fn abandon_step(ctx: &WorkerContext, job: &QueueJob) -> WorkerResult<()> {
    let Some(index) = job.chain_index() else {
        return Ok(());
    };

    finish_chain(ctx.backend.as_ref(), job.task_id(), index, ChainState::Failed).await?;
    metrics::record_chain(ChainState::Failed.as_str());
    Ok(())
}
