//! Job submission and status endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::info;

use genmedia_models::{
    CreateJobRequest, CreateJobResponse, JobId, JobStatusResponse, OperationStatusResponse,
};
use genmedia_queue::QueuedJob;

use crate::error::ApiResult;
use crate::state::AppState;

/// Submit a new generation job.
///
/// The request is validated before anything is enqueued, so a rejected
/// submission leaves no trace in the queue.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    request.validate()?;

    let job_id = JobId::new();
    let mode = request.mode;
    let total_steps = request.total_steps();
    let job = QueuedJob::new(job_id.clone(), request);
    state.queue.submit(&job).await?;

    info!(job_id = %job_id, %mode, "Submitted job");
    Ok((
        StatusCode::ACCEPTED,
        Json(CreateJobResponse::queued(job_id, mode, total_steps)),
    ))
}

/// Current status of a job. Unknown ids answer 200 with a `not_found`
/// document so pollers can treat expiry and typos uniformly.
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let status = state.resolver.resolve(&JobId::from_string(job_id)).await?;
    Ok(Json(status))
}

/// Long-poll variant of the status endpoint: the request is held open until
/// the job reaches a terminal state or the ceiling elapses, whichever comes
/// first. The latest status is returned either way.
pub async fn wait_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id = JobId::from_string(job_id);
    let deadline = Instant::now() + state.config.long_poll_ceiling;
    let mut interval = tokio::time::interval(state.config.long_poll_interval);

    loop {
        interval.tick().await;
        let status = state.resolver.resolve(&job_id).await?;
        if status.is_terminal() || Instant::now() >= deadline {
            return Ok(Json(status));
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OperationStatusQuery {
    pub operation_name: String,
}

/// Probe a long-running video operation directly by its vendor handle.
pub async fn operation_status(
    State(state): State<AppState>,
    Query(query): Query<OperationStatusQuery>,
) -> ApiResult<Json<OperationStatusResponse>> {
    let status = state.resolver.probe_operation(&query.operation_name).await?;
    Ok(Json(status))
}
