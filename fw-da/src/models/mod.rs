//! Data models for fw-da

pub mod boundary;
pub mod explanation;
pub mod grid;
pub mod job;
pub mod metrics;
pub mod raster;

pub use boundary::{Boundary, Point};
pub use explanation::{Explanation, ExplanationStatus, DEFAULT_CONFIDENCE};
pub use grid::{Mask, ProbabilityMap};
pub use job::{
    AnalysisJob, AnalysisResult, DatePair, JobImages, JobState, PipelineStage, TransitionError,
};
pub use metrics::{Metrics, Patch, PixelBounds, Severity, SeverityThresholds, M2_PER_HECTARE};
pub use raster::{
    is_nodata, Extent, GeoTransform, Raster, BAND_BLUE, BAND_GREEN, BAND_NIR, BAND_RED, NODATA,
};
