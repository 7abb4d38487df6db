//! Job submission and queue inspection route handlers.

use std::path::PathBuf;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use hf_core::JobId;
use hf_package::{JobSummary, PriorityKey, SchedulerStats};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;

#[derive(Serialize)]
pub struct JobsResponse {
    pub stats: SchedulerStats,
    pub jobs: Vec<JobSummary>,
}

/// GET /api/jobs
pub async fn list_jobs(State(ctx): State<AppContext>) -> Json<JobsResponse> {
    Json(JobsResponse {
        stats: ctx.scheduler.stats(),
        jobs: ctx.scheduler.jobs(),
    })
}

#[derive(Deserialize)]
pub struct SubmitJobRequest {
    pub path: PathBuf,
}

#[derive(Serialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub key: PriorityKey,
    pub package_dir: PathBuf,
}

/// POST /api/jobs
///
/// Queues the file and returns immediately; the outcome is reported on the
/// event bus.
pub async fn submit_job(
    State(ctx): State<AppContext>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), AppError> {
    let handle = ctx.scheduler.submit(&req.path).await?;
    let response = SubmitJobResponse {
        job_id: handle.id,
        key: handle.key,
        package_dir: handle.package_dir.clone(),
    };
    tokio::spawn(async move {
        let id = handle.id;
        let outcome = handle.wait().await;
        tracing::debug!(job_id = %id, completed = outcome.is_completed(), "Submitted job finished");
    });
    Ok((StatusCode::ACCEPTED, Json(response)))
}
