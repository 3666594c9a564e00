//! Rendered image download
//!
//! GET /api/images/:job_id/:kind where kind is `before`, `after` or
//! `highlight`.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::api::analysis::parse_job_id;
use crate::error::{ApiError, ApiResult};
use crate::services::Artifact;
use crate::AppState;

/// GET /api/images/:job_id/:kind
///
/// Images exist only for completed jobs; anything else is a 404.
pub async fn job_image(
    State(state): State<AppState>,
    Path((job_id, kind)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let artifact = Artifact::image_from_kind(&kind).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Unknown image kind '{}'. Use before, after or highlight",
            kind
        ))
    })?;
    let job_id = parse_job_id(&job_id)?;

    let result = state
        .job_manager
        .results(job_id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;

    let bytes = state
        .job_manager
        .pipeline()
        .store()
        .read(job_id, artifact)
        .await
        .map_err(|e| {
            tracing::warn!(job_id = %job_id, dir = %result.output_dir.display(), error = %e, "Image missing for completed job");
            ApiError::NotFound(format!("Image not found: {}", kind))
        })?;

    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

pub fn image_routes() -> Router<AppState> {
    Router::new().route("/api/images/:job_id/:kind", get(job_image))
}
