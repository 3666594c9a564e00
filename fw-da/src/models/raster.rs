//! Georeferenced multi-band rasters
//!
//! Samples are stored band-major, each band row-major (`row * width + col`).
//! Georeferencing is north-up: `origin` is the top-left corner of the
//! top-left pixel, columns grow east by `resolution_x`, rows grow south by
//! `resolution_y`. Coordinates are in a projected CRS measured in metres.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// No-data sentinel; never treated as forest or as change
pub const NODATA: f32 = -9999.0;

/// Band index of the blue channel (Sentinel-2 B02)
pub const BAND_BLUE: usize = 0;
/// Band index of the green channel (Sentinel-2 B03)
pub const BAND_GREEN: usize = 1;
/// Band index of the red channel (Sentinel-2 B04)
pub const BAND_RED: usize = 2;
/// Band index of the near-infrared channel (Sentinel-2 B08)
pub const BAND_NIR: usize = 3;

/// Whether a sample is the no-data sentinel
pub fn is_nodata(sample: f32) -> bool {
    sample == NODATA || sample.is_nan()
}

/// Axis-aligned rectangle in map coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True when the extent has no area
    pub fn is_empty(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Overlap of two extents, `None` when they share no area
    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        let result = Extent {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        (!result.is_empty()).then_some(result)
    }
}

/// North-up affine georeferencing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X of the top-left corner
    pub origin_x: f64,
    /// Y of the top-left corner
    pub origin_y: f64,
    /// Pixel width in metres
    pub resolution_x: f64,
    /// Pixel height in metres (positive; rows run south)
    pub resolution_y: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, resolution_x: f64, resolution_y: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            resolution_x,
            resolution_y,
        }
    }

    /// Map coordinates of the centre of pixel (`col`, `row`)
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.resolution_x,
            self.origin_y - (row as f64 + 0.5) * self.resolution_y,
        )
    }

    /// Fractional pixel coordinates (col, row) of a map point
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.resolution_x,
            (self.origin_y - y) / self.resolution_y,
        )
    }

    /// Ground area covered by one pixel
    pub fn pixel_area(&self) -> f64 {
        self.resolution_x * self.resolution_y
    }
}

/// A 2D multi-band grid with georeferencing
///
/// Immutable once produced by a stage; transformations return new rasters.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    bands: Vec<Vec<f32>>,
    transform: GeoTransform,
    crs: String,
    cloud_cover: Option<f32>,
    acquired: Option<NaiveDate>,
}

impl Raster {
    /// Build a raster, checking every band holds `width * height` samples
    pub fn new(
        width: usize,
        height: usize,
        bands: Vec<Vec<f32>>,
        transform: GeoTransform,
        crs: impl Into<String>,
    ) -> Result<Self, AnalysisError> {
        if width == 0 || height == 0 {
            return Err(AnalysisError::Internal(format!(
                "raster dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        if bands.is_empty() {
            return Err(AnalysisError::Internal("raster has no bands".to_string()));
        }
        if let Some((index, band)) = bands
            .iter()
            .enumerate()
            .find(|(_, band)| band.len() != width * height)
        {
            return Err(AnalysisError::Internal(format!(
                "band {} holds {} samples, expected {}",
                index,
                band.len(),
                width * height
            )));
        }
        if !(transform.resolution_x > 0.0 && transform.resolution_y > 0.0) {
            return Err(AnalysisError::Internal(format!(
                "raster resolution must be positive, got {}x{}",
                transform.resolution_x, transform.resolution_y
            )));
        }

        Ok(Self {
            width,
            height,
            bands,
            transform,
            crs: crs.into(),
            cloud_cover: None,
            acquired: None,
        })
    }

    /// Attach the scene cloud-cover percentage
    pub fn with_cloud_cover(mut self, cloud_cover: f32) -> Self {
        self.cloud_cover = Some(cloud_cover);
        self
    }

    /// Attach the acquisition date
    pub fn with_acquired(mut self, date: NaiveDate) -> Self {
        self.acquired = Some(date);
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn band(&self, index: usize) -> Option<&[f32]> {
        self.bands.get(index).map(Vec::as_slice)
    }

    pub fn bands(&self) -> &[Vec<f32>] {
        &self.bands
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn cloud_cover(&self) -> Option<f32> {
        self.cloud_cover
    }

    pub fn acquired(&self) -> Option<NaiveDate> {
        self.acquired
    }

    /// Map extent covered by the raster
    pub fn extent(&self) -> Extent {
        let t = &self.transform;
        Extent {
            min_x: t.origin_x,
            max_x: t.origin_x + self.width as f64 * t.resolution_x,
            max_y: t.origin_y,
            min_y: t.origin_y - self.height as f64 * t.resolution_y,
        }
    }

    /// Linear index of (`col`, `row`)
    pub fn index(&self, col: usize, row: usize) -> usize {
        row * self.width + col
    }

    /// A pixel is valid when no band holds the no-data sentinel
    pub fn is_valid(&self, index: usize) -> bool {
        self.bands.iter().all(|band| !is_nodata(band[index]))
    }

    /// Count of valid pixels
    pub fn valid_pixel_count(&self) -> usize {
        (0..self.width * self.height)
            .filter(|&i| self.is_valid(i))
            .count()
    }

    /// Same grid and georeferencing as `other`
    pub fn same_grid(&self, other: &Raster) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.transform == other.transform
    }

    /// Replace sample data while keeping metadata
    pub(crate) fn with_bands(
        &self,
        width: usize,
        height: usize,
        bands: Vec<Vec<f32>>,
        transform: GeoTransform,
    ) -> Result<Self, AnalysisError> {
        let mut raster = Raster::new(width, height, bands, transform, self.crs.clone())?;
        raster.cloud_cover = self.cloud_cover;
        raster.acquired = self.acquired;
        Ok(raster)
    }
}
