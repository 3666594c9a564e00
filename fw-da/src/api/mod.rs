//! HTTP API handlers for fw-da
//!
//! REST endpoints for submitting and polling analysis jobs, plus an SSE
//! stream of job events.

pub mod analysis;
pub mod dates;
pub mod health;
pub mod images;
pub mod sse;

pub use analysis::analysis_routes;
pub use dates::date_routes;
pub use health::health_routes;
pub use images::image_routes;
pub use sse::event_stream;
