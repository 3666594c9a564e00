//! Change detection orchestration
//!
//! Aligns the before/after rasters onto one grid, runs the injected
//! [`InferenceEngine`] and checks its output against the aligned grid.
//!
//! Alignment: when the grids differ, both rasters are cropped to the
//! intersection of their extents and resampled (nearest neighbour) to the
//! finer resolution on each axis. The target grid depends only on the two
//! inputs, so alignment is deterministic.

use std::borrow::Cow;
use std::sync::Arc;

use crate::collaborators::InferenceEngine;
use crate::error::AnalysisError;
use crate::models::{GeoTransform, ProbabilityMap, Raster};

/// Detector wrapping an inference capability
#[derive(Clone)]
pub struct ChangeDetector {
    engine: Arc<dyn InferenceEngine>,
}

impl ChangeDetector {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Probability of change between `before` and `after`
    ///
    /// The returned map is on the aligned grid; use [`align`] to obtain the
    /// matching rasters.
    pub fn detect(&self, before: &Raster, after: &Raster) -> Result<ProbabilityMap, AnalysisError> {
        let (before, after) = align(before, after)?;
        self.predict_aligned(&before, &after)
    }

    /// Run inference on rasters already sharing one grid
    pub fn predict_aligned(
        &self,
        before: &Raster,
        after: &Raster,
    ) -> Result<ProbabilityMap, AnalysisError> {
        if !before.same_grid(after) {
            return Err(AnalysisError::Alignment(
                "rasters passed to inference do not share a grid".to_string(),
            ));
        }

        let map = self.engine.predict(before, after)?;

        if map.width() != before.width() || map.height() != before.height() {
            return Err(AnalysisError::Inference(format!(
                "{} returned a {}x{} grid for {}x{} input",
                self.engine.name(),
                map.width(),
                map.height(),
                before.width(),
                before.height()
            )));
        }

        // Change is only defined where both dates have data
        let mut map = map;
        let valid: Vec<bool> = (0..before.width() * before.height())
            .map(|i| before.is_valid(i) && after.is_valid(i))
            .collect();
        map.restrict(&valid);

        Ok(map)
    }
}

/// Bring two rasters onto a common grid
///
/// Identical grids are returned unchanged. Fails with `Alignment` when the
/// extents do not overlap or the overlap is smaller than one target pixel.
pub fn align<'a>(
    before: &'a Raster,
    after: &'a Raster,
) -> Result<(Cow<'a, Raster>, Cow<'a, Raster>), AnalysisError> {
    if before.same_grid(after) {
        return Ok((Cow::Borrowed(before), Cow::Borrowed(after)));
    }

    let overlap = before
        .extent()
        .intersection(&after.extent())
        .ok_or_else(|| AnalysisError::Alignment("rasters share no common extent".to_string()))?;

    let bt = before.transform();
    let at = after.transform();
    let resolution_x = bt.resolution_x.min(at.resolution_x);
    let resolution_y = bt.resolution_y.min(at.resolution_y);
    let width = (overlap.width() / resolution_x).floor() as usize;
    let height = (overlap.height() / resolution_y).floor() as usize;

    if width == 0 || height == 0 {
        return Err(AnalysisError::Alignment(format!(
            "common extent {:.2}x{:.2} m is smaller than one {}x{} m pixel",
            overlap.width(),
            overlap.height(),
            resolution_x,
            resolution_y
        )));
    }

    let target = GeoTransform::new(overlap.min_x, overlap.max_y, resolution_x, resolution_y);

    tracing::debug!(
        width,
        height,
        resolution_x,
        resolution_y,
        "Aligning rasters to common grid"
    );

    Ok((
        Cow::Owned(resample(before, &target, width, height)?),
        Cow::Owned(resample(after, &target, width, height)?),
    ))
}

/// Nearest-neighbour resampling onto `target`
fn resample(
    raster: &Raster,
    target: &GeoTransform,
    width: usize,
    height: usize,
) -> Result<Raster, AnalysisError> {
    let source = raster.transform();
    let max_col = raster.width() - 1;
    let max_row = raster.height() - 1;

    let lookup: Vec<usize> = (0..height)
        .flat_map(|row| (0..width).map(move |col| (col, row)))
        .map(|(col, row)| {
            let (x, y) = target.pixel_center(col, row);
            let (fc, fr) = source.to_pixel(x, y);
            let c = (fc.floor().max(0.0) as usize).min(max_col);
            let r = (fr.floor().max(0.0) as usize).min(max_row);
            raster.index(c, r)
        })
        .collect();

    let bands = raster
        .bands()
        .iter()
        .map(|band| lookup.iter().map(|&i| band[i]).collect())
        .collect();

    raster.with_bands(width, height, bands, *target)
}
