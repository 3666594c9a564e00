//! Deterministic collaborators and fixtures for fw-da integration tests
//!
//! The scene is a 10x10 grid of 10 m pixels covering (0,0)-(100,100) with a
//! boundary over the whole grid. [`PatchEngine`] reports a 2x2 block at
//! p = 0.9 and one isolated pixel at p = 0.6, so a finished job has two
//! patches (400 m² and 100 m²) inside a 1 ha area.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use fw_common::events::EventBus;
use fw_da::collaborators::{
    AvailableDate, ImagerySource, InferenceEngine, Narrative, NarrativeGenerator,
    TemplateNarrator,
};
use fw_da::error::AnalysisError;
use fw_da::models::{AnalysisJob, Boundary, GeoTransform, Metrics, ProbabilityMap, Raster};
use fw_da::services::{AnalysisPipeline, JobManager, MetricsParams, OutputStore};
use fw_da::AppState;

pub const GRID: usize = 10;
pub const PIXEL: f64 = 10.0;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn boundary() -> Boundary {
    let mut boundary = Boundary::new(vec![
        [0.0, 0.0],
        [100.0, 0.0],
        [100.0, 100.0],
        [0.0, 100.0],
    ])
    .unwrap();
    boundary.name = Some("Test block".to_string());
    boundary
}

/// Uniform forest scene for every date except the ones listed as clouded
///
/// The scene's top-left corner is (0, 100) unless moved with [`Self::placed_at`].
pub struct FixedImagery {
    clouded: Vec<NaiveDate>,
    panicking: Vec<NaiveDate>,
    placements: Vec<(NaiveDate, f64, f64)>,
    listing: Vec<AvailableDate>,
}

impl FixedImagery {
    pub fn new() -> Self {
        Self {
            clouded: Vec::new(),
            panicking: Vec::new(),
            placements: Vec::new(),
            listing: Vec::new(),
        }
    }

    pub fn clouded_on(mut self, date: NaiveDate) -> Self {
        self.clouded.push(date);
        self
    }

    /// Fetching `date` panics instead of returning
    pub fn panicking_on(mut self, date: NaiveDate) -> Self {
        self.panicking.push(date);
        self
    }

    /// Scene for `date` with its top-left corner at (`origin_x`, `origin_y`)
    pub fn placed_at(mut self, date: NaiveDate, origin_x: f64, origin_y: f64) -> Self {
        self.placements.push((date, origin_x, origin_y));
        self
    }

    pub fn listing(mut self, listing: Vec<AvailableDate>) -> Self {
        self.listing = listing;
        self
    }
}

#[async_trait]
impl ImagerySource for FixedImagery {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn fetch(&self, date: NaiveDate) -> Result<Raster, AnalysisError> {
        if self.clouded.contains(&date) {
            return Err(AnalysisError::NoDataAvailable(format!(
                "no scene on {} under the cloud limit",
                date
            )));
        }
        if self.panicking.contains(&date) {
            panic!("imagery client crashed on {}", date);
        }

        let (origin_x, origin_y) = self
            .placements
            .iter()
            .find(|(d, _, _)| *d == date)
            .map(|(_, x, y)| (*x, *y))
            .unwrap_or((0.0, 100.0));
        let bands = [0.03_f32, 0.08, 0.04, 0.35]
            .iter()
            .map(|v| vec![*v; GRID * GRID])
            .collect();
        Ok(Raster::new(
            GRID,
            GRID,
            bands,
            GeoTransform::new(origin_x, origin_y, PIXEL, PIXEL),
            "EPSG:32643",
        )?
        .with_cloud_cover(5.0)
        .with_acquired(date))
    }

    async fn available_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AvailableDate>, AnalysisError> {
        Ok(self
            .listing
            .iter()
            .filter(|d| d.date >= start && d.date < end)
            .cloned()
            .collect())
    }
}

/// Probability grid with one 2x2 block and one isolated pixel
pub fn patch_probability() -> ProbabilityMap {
    let mut values = vec![0.0_f32; GRID * GRID];
    for (col, row) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
        values[row * GRID + col] = 0.9;
    }
    values[7 * GRID + 7] = 0.6;
    ProbabilityMap::new(GRID, GRID, values).unwrap()
}

pub struct PatchEngine;

impl InferenceEngine for PatchEngine {
    fn name(&self) -> &str {
        "patch"
    }

    fn predict(&self, _: &Raster, _: &Raster) -> Result<ProbabilityMap, AnalysisError> {
        Ok(patch_probability())
    }
}

pub struct FailingEngine;

impl InferenceEngine for FailingEngine {
    fn name(&self) -> &str {
        "failing"
    }

    fn predict(&self, _: &Raster, _: &Raster) -> Result<ProbabilityMap, AnalysisError> {
        Err(AnalysisError::Inference("model offline".to_string()))
    }
}

/// Holds detection until the test releases it
pub struct GatedEngine {
    gate: Mutex<Receiver<()>>,
}

impl GatedEngine {
    pub fn new() -> (Self, Sender<()>) {
        let (tx, rx) = channel();
        (Self { gate: Mutex::new(rx) }, tx)
    }
}

impl InferenceEngine for GatedEngine {
    fn name(&self) -> &str {
        "gated"
    }

    fn predict(&self, _: &Raster, _: &Raster) -> Result<ProbabilityMap, AnalysisError> {
        let released = self
            .gate
            .lock()
            .map_err(|_| AnalysisError::Inference("gate poisoned".to_string()))?
            .recv();
        match released {
            Ok(()) => Ok(patch_probability()),
            Err(_) => Err(AnalysisError::Inference("gate dropped".to_string())),
        }
    }
}

pub struct FailingNarrator;

#[async_trait]
impl NarrativeGenerator for FailingNarrator {
    fn model(&self) -> &str {
        "failing-narrator"
    }

    async fn explain(&self, _: &Metrics) -> Result<Narrative, AnalysisError> {
        Err(AnalysisError::Explanation("service unavailable".to_string()))
    }
}

pub struct PanickingNarrator;

#[async_trait]
impl NarrativeGenerator for PanickingNarrator {
    fn model(&self) -> &str {
        "panicking-narrator"
    }

    async fn explain(&self, _: &Metrics) -> Result<Narrative, AnalysisError> {
        panic!("unexpected response payload")
    }
}

pub fn pipeline_with(
    imagery: impl ImagerySource + 'static,
    engine: impl InferenceEngine + 'static,
    narrator: Arc<dyn NarrativeGenerator>,
    outputs: &std::path::Path,
) -> AnalysisPipeline {
    AnalysisPipeline::new(
        Arc::new(imagery),
        Arc::new(engine),
        narrator,
        Arc::new(boundary()),
        MetricsParams::default(),
        OutputStore::new(outputs),
    )
}

pub fn manager_with(pipeline: AnalysisPipeline) -> (JobManager, EventBus) {
    let event_bus = EventBus::new(100);
    (JobManager::new(Arc::new(pipeline), event_bus.clone()), event_bus)
}

/// Router over the standard scene with the given engine
pub fn app_with(
    imagery: FixedImagery,
    engine: impl InferenceEngine + 'static,
    outputs: &std::path::Path,
) -> (axum::Router, JobManager) {
    let pipeline = pipeline_with(imagery, engine, Arc::new(TemplateNarrator), outputs);
    let (manager, event_bus) = manager_with(pipeline);
    let state = AppState::new(manager.clone(), event_bus);
    (fw_da::build_router(state), manager)
}

/// Poll until the job is completed or failed
pub async fn wait_for_terminal(manager: &JobManager, job_id: Uuid) -> AnalysisJob {
    for _ in 0..500 {
        let job = manager.status(job_id).await.unwrap();
        if job.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish in time", job_id);
}

/// Poll until the job reports `progress`
pub async fn wait_for_progress(manager: &JobManager, job_id: Uuid, progress: u8) -> AnalysisJob {
    for _ in 0..500 {
        let job = manager.status(job_id).await.unwrap();
        if job.progress >= progress {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached {}%", job_id, progress);
}
