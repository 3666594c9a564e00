//! fw-da library interface
//!
//! Deforestation analysis service: imagery for two dates is clipped to the
//! area of interest, compared for vegetation loss, and summarised as metrics,
//! patches, highlight images and a narrative. Jobs run in the background and
//! are followed by polling or over SSE.

pub mod api;
pub mod collaborators;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{AnalysisError, ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use fw_common::events::EventBus;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::JobManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Job registry and pipeline
    pub job_manager: JobManager,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Set when running on the built-in boundary
    pub demo_boundary: bool,
}

impl AppState {
    pub fn new(job_manager: JobManager, event_bus: EventBus) -> Self {
        Self {
            job_manager,
            event_bus,
            startup_time: Utc::now(),
            demo_boundary: false,
        }
    }

    pub fn with_demo_boundary(mut self, demo: bool) -> Self {
        self.demo_boundary = demo;
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::health_routes())
        .merge(api::analysis_routes())
        .merge(api::date_routes())
        .merge(api::image_routes())
        .route("/api/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
