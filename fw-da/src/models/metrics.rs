//! Patch and aggregate metrics types

use serde::{Deserialize, Serialize};

/// Square metres per hectare
pub const M2_PER_HECTARE: f64 = 10_000.0;

/// Per-pixel change classification used for visualization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Probability above the confirmed threshold ("red")
    Confirmed,
    /// Probability between degradation and confirmed thresholds ("yellow")
    Possible,
    /// Probability below the degradation threshold ("green")
    Intact,
}

/// Severity cut points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeverityThresholds {
    /// Strictly above this is confirmed loss
    pub confirmed: f32,
    /// At or above this (up to confirmed) is possible degradation
    pub degradation: f32,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            confirmed: 0.7,
            degradation: 0.4,
        }
    }
}

impl SeverityThresholds {
    pub fn classify(&self, probability: f32) -> Severity {
        if probability > self.confirmed {
            Severity::Confirmed
        } else if probability >= self.degradation {
            Severity::Possible
        } else {
            Severity::Intact
        }
    }
}

/// Inclusive pixel bounding box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBounds {
    pub min_col: usize,
    pub min_row: usize,
    pub max_col: usize,
    pub max_row: usize,
}

/// A maximal connected region of changed pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// 1-based label in discovery (row-major) order
    pub label: u32,
    pub pixel_count: usize,
    /// `pixel_count * resolution_x * resolution_y`
    pub area_m2: f64,
    /// Arithmetic mean of the probability map over the patch pixels
    pub mean_probability: f32,
    pub severity: Severity,
    pub bounds: PixelBounds,
}

impl Patch {
    pub fn area_hectares(&self) -> f64 {
        self.area_m2 / M2_PER_HECTARE
    }
}

/// Aggregate forest-loss metrics for one analysis
///
/// `deforested_area_m2` is the sum of patch areas and
/// `intact_forest_m2 = total_area_m2 - deforested_area_m2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_area_m2: f64,
    pub total_area_hectares: f64,
    pub deforested_area_m2: f64,
    pub deforested_area_hectares: f64,
    /// `100 * deforested / total`, within [0, 100]
    pub forest_loss_percentage: f64,
    pub number_of_patches: usize,
    pub largest_patch_m2: f64,
    pub largest_patch_hectares: f64,
    pub intact_forest_m2: f64,
    pub intact_forest_hectares: f64,
    pub pixel_size_meters: f64,
    /// Pixels inside the area of interest
    pub total_pixels: usize,
    pub deforested_pixels: usize,
    /// Analytic polygon area, reported for reference only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundary_polygon_area_m2: Option<f64>,
}
