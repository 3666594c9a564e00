//! Analysis job API handlers
//!
//! POST /api/analyze, GET /api/status/:job_id, GET /api/results/:job_id

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    DatePair, Explanation, JobImages, JobState, Metrics, Patch, PipelineStage,
};
use crate::AppState;

/// POST /api/analyze request
///
/// Both fields are optional at the type level so a missing date is reported
/// as a 400 with a readable message instead of a body rejection.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub date_before: Option<String>,
    #[serde(default)]
    pub date_after: Option<String>,
}

/// POST /api/analyze response
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub status: String,
    pub job_id: Uuid,
    pub message: String,
}

/// GET /api/status response
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobState,
    pub progress: u8,
    /// Last stage that finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<PipelineStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// GET /api/results response
#[derive(Debug, Serialize)]
pub struct JobResultsResponse {
    pub job_id: Uuid,
    pub status: JobState,
    pub metrics: Metrics,
    pub patches: Vec<Patch>,
    pub explanation: Explanation,
    pub images: JobImages,
    pub dates: DatePair,
}

/// POST /api/analyze
///
/// Validate the dates and queue a job. Returns 202 Accepted with the job id;
/// the pipeline runs in the background. Unreadable bodies are 400s.
pub async fn start_analysis(
    State(state): State<AppState>,
    request: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AnalyzeResponse>)> {
    let Json(request) = request?;
    let (date_before, date_after) = match (request.date_before, request.date_after) {
        (Some(before), Some(after)) => (before, after),
        _ => {
            return Err(ApiError::BadRequest(
                "Missing date_before or date_after".to_string(),
            ))
        }
    };

    let job_id = state.job_manager.submit(&date_before, &date_after).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeResponse {
            status: "success".to_string(),
            job_id,
            message: "Analysis started".to_string(),
        }),
    ))
}

/// GET /api/status/:job_id
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.job_manager.status(job_id).await?;

    Ok(Json(JobStatusResponse {
        job_id: job.job_id,
        status: job.state,
        progress: job.progress,
        stage: job.stage,
        error: job.error,
        created_at: job.created_at,
        updated_at: job.updated_at,
    }))
}

/// GET /api/results/:job_id
///
/// 409 until the job has completed; a failed job never has results.
pub async fn job_results(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResultsResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let result = state.job_manager.results(job_id).await?;

    Ok(Json(JobResultsResponse {
        job_id,
        status: JobState::Completed,
        metrics: result.metrics.clone(),
        patches: result.patches.clone(),
        explanation: result.explanation.clone(),
        images: result.images.clone(),
        dates: result.dates,
    }))
}

/// Unparseable ids cannot name a job, so they are reported as unknown
pub(crate) fn parse_job_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("Job not found: {}", raw)))
}

/// Build analysis routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analyze", post(start_analysis))
        .route("/api/status/:job_id", get(job_status))
        .route("/api/results/:job_id", get(job_results))
}
