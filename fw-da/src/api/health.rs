//! Health check and service index

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::models::M2_PER_HECTARE;
use crate::AppState;

/// Area of interest the service analyses
#[derive(Debug, Serialize)]
pub struct BoundaryInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub area_hectares: f64,
    /// Built-in boundary used because no boundary file was found
    pub demo: bool,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("fw-da")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub boundary: BoundaryInfo,
    /// Jobs queued or processing
    pub active_jobs: usize,
    pub total_jobs: usize,
}

/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let boundary = state.job_manager.pipeline().boundary();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "fw-da".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        boundary: BoundaryInfo {
            name: boundary.name.clone(),
            area_hectares: boundary.area() / M2_PER_HECTARE,
            demo: state.demo_boundary,
        },
        active_jobs: state.job_manager.active_jobs().await,
        total_jobs: state.job_manager.job_count().await,
    })
}

/// GET /
pub async fn service_index() -> Json<Value> {
    Json(json!({
        "service": "fw-da",
        "description": "Forest Watch deforestation analysis",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "analyze": "POST /api/analyze",
            "status": "GET /api/status/{job_id}",
            "results": "GET /api/results/{job_id}",
            "images": "GET /api/images/{job_id}/{before|after|highlight}",
            "available_dates": "GET /api/available-dates?quarter=YYYY-Qn",
            "events": "GET /api/events",
            "health": "GET /api/health",
        }
    }))
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(service_index))
        .route("/api/health", get(health_check))
}
