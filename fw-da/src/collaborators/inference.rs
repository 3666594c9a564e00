//! Change inference capability
//!
//! The pipeline only relies on [`InferenceEngine::predict`]. The built-in
//! [`VegetationIndexModel`] scores loss of green vegetation between two dates
//! and needs no weights, so it also serves as the offline default.

use crate::error::AnalysisError;
use crate::models::{ProbabilityMap, Raster, BAND_GREEN, BAND_RED};

/// Prediction of per-pixel change between two aligned rasters
///
/// Inputs share one grid; the returned map has the same dimensions.
/// Implementations may block, callers run them off the async executor.
pub trait InferenceEngine: Send + Sync {
    /// Model identifier for logs
    fn name(&self) -> &str;

    fn predict(&self, before: &Raster, after: &Raster) -> Result<ProbabilityMap, AnalysisError>;
}

/// Rule-based detector on a green/red vegetation index
///
/// `vi = (G - R) / (G + R + ε)`, change probability is
/// `clamp(-gain * (vi_after - vi_before), 0, 1)`, smoothed with a separable
/// Gaussian that ignores no-data pixels.
#[derive(Debug, Clone)]
pub struct VegetationIndexModel {
    /// Gaussian sigma in pixels; 0 disables smoothing
    sigma: f32,
    gain: f32,
    epsilon: f32,
}

impl Default for VegetationIndexModel {
    fn default() -> Self {
        Self {
            sigma: 2.0,
            gain: 2.0,
            epsilon: 1e-6,
        }
    }
}

impl VegetationIndexModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set smoothing sigma in pixels
    pub fn with_sigma(mut self, sigma: f32) -> Result<Self, AnalysisError> {
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "smoothing sigma must be >= 0, got {}",
                sigma
            )));
        }
        self.sigma = sigma;
        Ok(self)
    }

    fn vegetation_index(&self, raster: &Raster) -> Result<Vec<f32>, AnalysisError> {
        let green = raster
            .band(BAND_GREEN)
            .ok_or_else(|| AnalysisError::Inference("raster has no green band".to_string()))?;
        let red = raster
            .band(BAND_RED)
            .ok_or_else(|| AnalysisError::Inference("raster has no red band".to_string()))?;

        Ok(green
            .iter()
            .zip(red)
            .map(|(g, r)| (g - r) / (g + r + self.epsilon))
            .collect())
    }
}

impl InferenceEngine for VegetationIndexModel {
    fn name(&self) -> &str {
        "vegetation-index"
    }

    fn predict(&self, before: &Raster, after: &Raster) -> Result<ProbabilityMap, AnalysisError> {
        if !before.same_grid(after) {
            return Err(AnalysisError::Inference(format!(
                "input grids differ: {}x{} vs {}x{}",
                before.width(),
                before.height(),
                after.width(),
                after.height()
            )));
        }

        let (width, height) = (before.width(), before.height());
        let vi_before = self.vegetation_index(before)?;
        let vi_after = self.vegetation_index(after)?;

        let footprint: Vec<bool> = (0..width * height)
            .map(|i| before.is_valid(i) && after.is_valid(i))
            .collect();

        let raw: Vec<f32> = vi_before
            .iter()
            .zip(&vi_after)
            .zip(&footprint)
            .map(|((b, a), inside)| {
                if *inside {
                    (-self.gain * (a - b)).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            })
            .collect();

        let smoothed = if self.sigma > 0.0 {
            let kernel = gaussian_kernel(self.sigma);
            smooth(&raw, &footprint, width, height, &kernel)
        } else {
            raw
        };

        ProbabilityMap::with_footprint(width, height, smoothed, footprint)
    }
}

/// Normalised 1-D Gaussian, radius `ceil(3σ)`
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil() as i64;
    let weights: Vec<f32> = (-radius..=radius)
        .map(|x| (-((x * x) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Separable convolution over pixels inside `valid`, renormalised per pixel
fn smooth(values: &[f32], valid: &[bool], width: usize, height: usize, kernel: &[f32]) -> Vec<f32> {
    let horizontal = convolve_axis(values, valid, width, height, kernel, true);
    convolve_axis(&horizontal, valid, width, height, kernel, false)
}

fn convolve_axis(
    values: &[f32],
    valid: &[bool],
    width: usize,
    height: usize,
    kernel: &[f32],
    along_rows: bool,
) -> Vec<f32> {
    let radius = (kernel.len() / 2) as i64;
    let mut out = vec![0.0; values.len()];

    for row in 0..height {
        for col in 0..width {
            let index = row * width + col;
            if !valid[index] {
                continue;
            }

            let mut sum = 0.0;
            let mut weight = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let offset = k as i64 - radius;
                let (c, r) = if along_rows {
                    (col as i64 + offset, row as i64)
                } else {
                    (col as i64, row as i64 + offset)
                };
                if c < 0 || r < 0 || c >= width as i64 || r >= height as i64 {
                    continue;
                }
                let neighbour = r as usize * width + c as usize;
                if valid[neighbour] {
                    sum += w * values[neighbour];
                    weight += w;
                }
            }
            out[index] = if weight > 0.0 { sum / weight } else { 0.0 };
        }
    }

    out
}
