//! Imagery date listing
//!
//! GET /api/available-dates?quarter=YYYY-Qn

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use fw_common::dates::Quarter;
use serde::{Deserialize, Serialize};

use crate::collaborators::AvailableDate;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AvailableDatesQuery {
    pub quarter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvailableDatesResponse {
    pub success: bool,
    pub quarter: String,
    pub dates: Vec<AvailableDate>,
    pub total: usize,
}

/// GET /api/available-dates
///
/// Acquisitions inside the quarter, one entry per date, oldest first.
pub async fn available_dates(
    State(state): State<AppState>,
    Query(query): Query<AvailableDatesQuery>,
) -> ApiResult<Json<AvailableDatesResponse>> {
    let raw = query
        .quarter
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing quarter parameter".to_string()))?;
    let quarter: Quarter = raw.parse()?;

    let imagery = state.job_manager.pipeline().imagery();
    let listed = imagery
        .available_dates(quarter.start(), quarter.end())
        .await?;
    let dates = dedupe_dates(listed);

    tracing::debug!(quarter = %quarter, total = dates.len(), "Listed available dates");

    Ok(Json(AvailableDatesResponse {
        success: true,
        quarter: quarter.to_string(),
        total: dates.len(),
        dates,
    }))
}

/// Sort ascending and keep the first listing of each date
fn dedupe_dates(mut dates: Vec<AvailableDate>) -> Vec<AvailableDate> {
    dates.sort_by_key(|d| d.date);
    dates.dedup_by_key(|d| d.date);
    dates
}

pub fn date_routes() -> Router<AppState> {
    Router::new().route("/api/available-dates", get(available_dates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn listing(day: u32, cloud_cover: f32) -> AvailableDate {
        AvailableDate {
            date: NaiveDate::from_ymd_opt(2020, 1, day).unwrap(),
            cloud_cover,
            cached: false,
        }
    }

    #[test]
    fn test_dedupe_sorts_and_keeps_first() {
        let dates = dedupe_dates(vec![
            listing(11, 5.0),
            listing(1, 12.0),
            listing(11, 40.0),
            listing(6, 0.0),
        ]);

        let days: Vec<u32> = dates.iter().map(|d| chrono::Datelike::day(&d.date)).collect();
        assert_eq!(days, vec![1, 6, 11]);
        assert_eq!(dates[2].cloud_cover, 5.0);
    }
}
