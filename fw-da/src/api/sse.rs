//! Job event stream
//!
//! GET /api/events forwards every job event on the bus. Polling the status
//! endpoint remains the primary way to follow a job.

use axum::{extract::State, response::sse::Event, response::Sse};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /api/events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    fw_common::sse::create_event_sse_stream("fw-da", &state.event_bus)
}
