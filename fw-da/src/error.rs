//! Error types for fw-da
//!
//! [`AnalysisError`] is the domain taxonomy raised by pipeline stages and the
//! job manager. [`ApiError`] is what HTTP handlers return; every analysis
//! error maps onto exactly one HTTP status.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::JobState;

/// Domain errors of the analysis pipeline
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    /// Bad or missing request dates; rejected before a job exists
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Retrieval found no usable imagery for a date / cloud-cover constraint
    #[error("No imagery available: {0}")]
    NoDataAvailable(String),

    /// Boundary does not intersect the raster
    #[error("Boundary does not intersect raster: {0}")]
    DisjointGeometry(String),

    /// Before/after rasters share no common extent
    #[error("Rasters cannot be aligned: {0}")]
    Alignment(String),

    /// Prediction capability failed
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Narrative generation failed (never fails a job)
    #[error("Explanation failed: {0}")]
    Explanation(String),

    /// Unknown job id
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    /// Results requested before the job completed
    #[error("Job {job_id} not completed. Current status: {state}")]
    NotReady { job_id: Uuid, state: JobState },

    /// Persisting job artifacts failed
    #[error("Failed to write outputs: {0}")]
    Output(String),

    /// Invariant violation inside the service
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AnalysisError {
    fn from(err: std::io::Error) -> Self {
        AnalysisError::Output(err.to_string())
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., results requested while job still running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// fw-common error
    #[error("Common error: {0}")]
    Common(#[from] fw_common::Error),
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
            AnalysisError::NotFound(_) => ApiError::NotFound(err.to_string()),
            AnalysisError::NotReady { .. } => ApiError::Conflict(err.to_string()),
            AnalysisError::NoDataAvailable(_) => ApiError::NotFound(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "NOT_READY", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
            ApiError::Common(fw_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
