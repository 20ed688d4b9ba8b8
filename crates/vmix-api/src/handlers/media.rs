//! Media request ingress.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::info;
use vmix_models::{AcceptedResponse, MediaRequest};
use vmix_queue::{JobBackend, OrchestrateJob, QueueJob};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// `POST /process_media`: validate and enqueue orchestration.
///
/// Returns as soon as the job is queued.
pub async fn process_media(
    State(state): State<AppState>,
    payload: Result<Json<MediaRequest>, JsonRejection>,
) -> ApiResult<Json<AcceptedResponse>> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    if let Err(e) = request.validate(state.config.max_combinations) {
        metrics::record_request_rejected(e.code());
        return Err(e.into());
    }

    let combinations = request.combination_count().unwrap_or_default();
    let job = OrchestrateJob::new(request);
    let task_id = job.task_id.clone();

    state.backend.enqueue(QueueJob::Orchestrate(job)).await?;
    metrics::record_job_enqueued("orchestrate");

    info!(task_id = %task_id, combinations, "Accepted media request");
    Ok(Json(AcceptedResponse::accepted(task_id)))
}
