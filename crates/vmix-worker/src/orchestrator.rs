//! Turns a request into a submitted job graph.

use std::time::Instant;

use tracing::{error, info, warn};
use vmix_models::{ProcessingSummary, TaskPhase};
use vmix_queue::{
    CleanupJob, CleanupTrigger, JobGraphBuilder, OrchestrateJob, QueueError, QueueJob, RenderParams,
};

use crate::combinations::{pick_tracks, CombinationPlanner};
use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::workspace::WorkTask;

/// Prepare assets, plan combinations and submit the graph.
///
/// Returns as soon as every render is enqueued. Any failure before
/// submission dispatches cleanup for the task directory, then propagates.
pub async fn orchestrate(ctx: &WorkerContext, job: &OrchestrateJob) -> WorkerResult<ProcessingSummary> {
    let task = WorkTask::new(&ctx.config.work_dir, job.task_id.clone());

    match submit_graph(ctx, job, &task).await {
        Ok(summary) => Ok(summary),
        Err(e) => {
            error!(task_id = %job.task_id, "Setup failed: {}", e);
            dispatch_setup_cleanup(ctx, job, &task).await;
            Err(e)
        }
    }
}

async fn submit_graph(
    ctx: &WorkerContext,
    job: &OrchestrateJob,
    task: &WorkTask,
) -> WorkerResult<ProcessingSummary> {
    let request = &job.request;
    let task_id = &job.task_id;
    let start = Instant::now();

    // Reject oversized requests before touching the network
    request.validate(ctx.config.max_combinations)?;
    info!(task_id = %task_id, task_name = %request.task_name, phase = %TaskPhase::Started, "Processing request");

    task.create().await?;

    let (media, voiceovers) = tokio::try_join!(
        async {
            ctx.fetcher
                .prepare_media(
                    &request.video_blocks,
                    &request.audio_blocks,
                    &task.videos_dir(),
                    &task.audio_dir(),
                )
                .await
                .map_err(WorkerError::from)
        },
        async {
            ctx.voices
                .prepare_voiceovers(&request.text_to_speech, &task.tts_dir())
                .await
                .map_err(WorkerError::from)
        },
    )?;
    info!(
        task_id = %task_id,
        phase = %TaskPhase::AssetsReady,
        "Assets ready in {:.2}s",
        start.elapsed().as_secs_f64()
    );

    let combinations =
        CombinationPlanner::with_limit(ctx.config.max_combinations).plan(&media.videos_by_block)?;
    let total = combinations.total();

    let mut builder = JobGraphBuilder::new(
        task_id.clone(),
        request.task_name.clone(),
        task.root(),
        job.submitted_at,
    )
    .with_capacity(total);

    {
        let mut rng = rand::rng();
        for combination in combinations {
            let (audio, voiceover) = pick_tracks(&mut rng, &media.audio, &voiceovers)
                .ok_or_else(|| WorkerError::job_failed("no audio track or voiceover to pair with"))?;
            builder.add_chain(RenderParams {
                videos: combination.videos,
                audio,
                voiceover,
                index: combination.index,
                total,
            });
        }
    }

    match builder.build().submit(ctx.backend.as_ref()).await {
        Ok(_) => {}
        // A barrier already exists: an earlier delivery of this job submitted the graph
        Err(QueueError::FanIn(msg)) => {
            warn!(task_id = %task_id, "Graph already submitted: {}", msg);
            return Ok(ProcessingSummary::processing(task_id.clone(), total as u64));
        }
        Err(e) => return Err(e.into()),
    }

    metrics::record_task_submitted(total);
    info!(
        task_id = %task_id,
        phase = %TaskPhase::GraphSubmitted,
        total,
        "Submitted {} combinations",
        total
    );

    Ok(ProcessingSummary::processing(task_id.clone(), total as u64))
}

/// Enqueue cleanup outside the graph, removing the directory in-process if
/// the backend refuses.
async fn dispatch_setup_cleanup(ctx: &WorkerContext, job: &OrchestrateJob, task: &WorkTask) {
    let cleanup = CleanupJob {
        task_id: job.task_id.clone(),
        work_dir: task.root().to_path_buf(),
        started_at: job.submitted_at,
        trigger: CleanupTrigger::SetupFailure,
    };

    match ctx.backend.enqueue(QueueJob::Cleanup(cleanup)).await {
        Ok(_) | Err(QueueError::Duplicate(_)) => {}
        Err(e) => {
            warn!(task_id = %job.task_id, "Failed to dispatch cleanup, removing locally: {}", e);
            if let Err(e) = task.remove().await {
                error!(task_id = %job.task_id, "Failed to remove {}: {}", task.root().display(), e);
            }
        }
    }
}
