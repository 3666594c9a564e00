//! Per-pixel analysis grids
//!
//! [`ProbabilityMap`] carries change likelihood plus a footprint marking the
//! pixels inside the area of interest. [`Mask`] is the thresholded boolean
//! grid. Both are row-major and share the dimensions of the aligned rasters.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Change likelihood per pixel, values in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityMap {
    width: usize,
    height: usize,
    values: Vec<f32>,
    /// `false` marks no-data pixels outside the area of interest
    footprint: Vec<bool>,
}

impl ProbabilityMap {
    /// Build a map with every pixel inside the footprint
    ///
    /// Values are clamped into [0, 1]; NaN becomes 0.
    pub fn new(width: usize, height: usize, values: Vec<f32>) -> Result<Self, AnalysisError> {
        let footprint = vec![true; values.len()];
        Self::with_footprint(width, height, values, footprint)
    }

    /// Build a map with an explicit footprint
    ///
    /// Pixels outside the footprint are forced to probability 0.
    pub fn with_footprint(
        width: usize,
        height: usize,
        mut values: Vec<f32>,
        footprint: Vec<bool>,
    ) -> Result<Self, AnalysisError> {
        if values.len() != width * height || footprint.len() != width * height {
            return Err(AnalysisError::Inference(format!(
                "probability grid has {} values / {} footprint cells, expected {}x{}",
                values.len(),
                footprint.len(),
                width,
                height
            )));
        }

        for (value, inside) in values.iter_mut().zip(&footprint) {
            *value = if *inside && value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                0.0
            };
        }

        Ok(Self {
            width,
            height,
            values,
            footprint,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn footprint(&self) -> &[bool] {
        &self.footprint
    }

    pub fn get(&self, col: usize, row: usize) -> f32 {
        self.values[row * self.width + col]
    }

    /// Whether pixel `index` lies inside the area of interest
    pub fn in_footprint(&self, index: usize) -> bool {
        self.footprint[index]
    }

    /// Number of pixels inside the area of interest
    pub fn footprint_pixels(&self) -> usize {
        self.footprint.iter().filter(|inside| **inside).count()
    }

    /// Restrict the footprint further; pixels dropped become 0
    pub fn restrict(&mut self, keep: &[bool]) {
        for ((value, inside), keep) in self.values.iter_mut().zip(&mut self.footprint).zip(keep) {
            if !keep {
                *inside = false;
                *value = 0.0;
            }
        }
    }
}

/// Binary change grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mask {
    width: usize,
    height: usize,
    cells: Vec<bool>,
}

impl Mask {
    pub fn new(width: usize, height: usize, cells: Vec<bool>) -> Result<Self, AnalysisError> {
        if cells.len() != width * height {
            return Err(AnalysisError::Internal(format!(
                "mask has {} cells, expected {}x{}",
                cells.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// All-false mask
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width * height],
        }
    }

    /// Build from rows of booleans; all rows must share a length
    pub fn from_rows(rows: &[&[bool]]) -> Result<Self, AnalysisError> {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != width) {
            return Err(AnalysisError::Internal("ragged mask rows".to_string()));
        }
        Self::new(width, height, rows.concat())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    pub fn get(&self, col: usize, row: usize) -> bool {
        self.cells[row * self.width + col]
    }

    pub fn set(&mut self, index: usize, value: bool) {
        self.cells[index] = value;
    }

    /// Number of true cells
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }
}
