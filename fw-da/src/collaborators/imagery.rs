//! Imagery retrieval capability
//!
//! [`SyntheticImagery`] stands in for a Sentinel-2 archive: it renders a
//! deterministic four-band forest scene per date over a fixed grid, with
//! clearings that open and widen over time. The same date always yields the
//! same raster and cloud cover.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::models::{Extent, GeoTransform, Raster};

/// One acquisition listed for date selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableDate {
    pub date: NaiveDate,
    /// Percentage 0-100
    pub cloud_cover: f32,
    /// Whether the scene is already held locally
    pub cached: bool,
}

/// Source of georeferenced imagery
#[async_trait]
pub trait ImagerySource: Send + Sync {
    /// Source identifier for logs
    fn name(&self) -> &str;

    /// Raster for `date`, with its cloud cover attached
    ///
    /// Fails with `NoDataAvailable` when no scene is usable within the
    /// acceptable cloud cover.
    async fn fetch(&self, date: NaiveDate) -> Result<Raster, AnalysisError>;

    /// Acquisitions with `start <= date < end`
    async fn available_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AvailableDate>, AnalysisError>;
}

/// Largest grid side the synthetic source will render
pub const MAX_DIMENSION: usize = 2048;
/// Days between consecutive acquisitions
pub const REVISIT_DAYS: i64 = 5;

const PADDING_PIXELS: f64 = 2.0;
const CLEARING_COUNT: usize = 8;
const DEFAULT_SITE_SEED: u64 = 0x5EED_F0E5;
const DEFAULT_CLOUD_CEILING: f32 = 30.0;

// Surface reflectance (B, G, R, NIR)
const FOREST: [f32; 4] = [0.03, 0.08, 0.04, 0.35];
const CLEARED: [f32; 4] = [0.09, 0.11, 0.15, 0.20];
const TEXTURE: f32 = 0.005;

/// A clearing that opens at `onset` and grows to full size over `growth_days`
#[derive(Debug, Clone)]
struct Clearing {
    center_col: f64,
    center_row: f64,
    max_radius: f64,
    onset: NaiveDate,
    growth_days: i64,
}

impl Clearing {
    fn radius_at(&self, date: NaiveDate) -> f64 {
        let elapsed = (date - self.onset).num_days();
        if elapsed < 0 {
            return 0.0;
        }
        let fraction = (elapsed as f64 / self.growth_days as f64).min(1.0);
        self.max_radius * fraction
    }
}

/// Deterministic synthetic scene generator
#[derive(Debug, Clone)]
pub struct SyntheticImagery {
    transform: GeoTransform,
    width: usize,
    height: usize,
    crs: String,
    max_cloud_cover: f32,
    cloud_ceiling: f32,
    site_seed: u64,
    clearings: Vec<Clearing>,
}

impl SyntheticImagery {
    /// Cover `extent` (padded by a couple of pixels) at `resolution` metres
    pub fn new(
        extent: Extent,
        resolution: f64,
        crs: impl Into<String>,
        max_cloud_cover: f32,
    ) -> Result<Self, AnalysisError> {
        if resolution.is_nan() || resolution <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "resolution must be positive, got {}",
                resolution
            )));
        }
        let pad = PADDING_PIXELS * resolution;
        let width = ((extent.width() + 2.0 * pad) / resolution).ceil() as usize;
        let height = ((extent.height() + 2.0 * pad) / resolution).ceil() as usize;
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(AnalysisError::InvalidInput(format!(
                "synthetic grid of {}x{} pixels is outside 1..={}",
                width, height, MAX_DIMENSION
            )));
        }

        let transform = GeoTransform::new(
            extent.min_x - pad,
            extent.max_y + pad,
            resolution,
            resolution,
        );

        let mut source = Self {
            transform,
            width,
            height,
            crs: crs.into(),
            max_cloud_cover,
            cloud_ceiling: DEFAULT_CLOUD_CEILING,
            site_seed: DEFAULT_SITE_SEED,
            clearings: Vec::new(),
        };
        source.clearings = source.plan_clearings();
        Ok(source)
    }

    /// Upper bound of the per-scene cloud cover draw
    pub fn with_cloud_ceiling(mut self, ceiling: f32) -> Self {
        self.cloud_ceiling = ceiling.clamp(0.0, 100.0);
        self
    }

    /// Use a different site layout
    pub fn with_site_seed(mut self, seed: u64) -> Self {
        self.site_seed = seed;
        self.clearings = self.plan_clearings();
        self
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn plan_clearings(&self) -> Vec<Clearing> {
        let mut rng = StdRng::seed_from_u64(self.site_seed);
        let short_side = self.width.min(self.height) as f64;
        let anchor = revisit_anchor();

        (0..CLEARING_COUNT)
            .map(|_| Clearing {
                center_col: rng.gen_range(0.1..0.9) * self.width as f64,
                center_row: rng.gen_range(0.1..0.9) * self.height as f64,
                max_radius: rng.gen_range(0.03..0.12) * short_side,
                onset: anchor + Duration::days(rng.gen_range(0..3650)),
                growth_days: rng.gen_range(180..720),
            })
            .collect()
    }

    fn scene_rng(&self, date: NaiveDate) -> StdRng {
        let day = (date - revisit_anchor()).num_days() as u64;
        StdRng::seed_from_u64(self.site_seed ^ day.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    /// Cloud cover of the scene for `date`, one decimal place
    pub fn cloud_cover_for(&self, date: NaiveDate) -> f32 {
        self.draw_cloud_cover(&mut self.scene_rng(date))
    }

    fn draw_cloud_cover(&self, rng: &mut StdRng) -> f32 {
        let raw: f32 = rng.gen::<f32>() * self.cloud_ceiling;
        (raw * 10.0).round() / 10.0
    }

    fn render(&self, date: NaiveDate) -> Result<Raster, AnalysisError> {
        let mut rng = self.scene_rng(date);
        let cloud_cover = self.draw_cloud_cover(&mut rng);

        let radii: Vec<f64> = self.clearings.iter().map(|c| c.radius_at(date)).collect();
        let pixels = self.width * self.height;
        let mut bands = vec![Vec::with_capacity(pixels); 4];

        for row in 0..self.height {
            for col in 0..self.width {
                let cleared = self.clearings.iter().zip(&radii).any(|(c, r)| {
                    let dx = col as f64 + 0.5 - c.center_col;
                    let dy = row as f64 + 0.5 - c.center_row;
                    *r > 0.0 && dx * dx + dy * dy <= r * r
                });
                let surface = if cleared { &CLEARED } else { &FOREST };
                for (band, base) in bands.iter_mut().zip(surface) {
                    band.push(base + rng.gen_range(-TEXTURE..TEXTURE));
                }
            }
        }

        Ok(
            Raster::new(self.width, self.height, bands, self.transform, self.crs.clone())?
                .with_cloud_cover(cloud_cover)
                .with_acquired(date),
        )
    }
}

/// First acquisition of the synthetic archive
fn revisit_anchor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 6, 27).unwrap_or(NaiveDate::MIN)
}

/// First acquisition on or after `date`
fn first_revisit_on_or_after(date: NaiveDate) -> NaiveDate {
    let offset = (date - revisit_anchor()).num_days().rem_euclid(REVISIT_DAYS);
    date + Duration::days((REVISIT_DAYS - offset) % REVISIT_DAYS)
}

#[async_trait]
impl ImagerySource for SyntheticImagery {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn fetch(&self, date: NaiveDate) -> Result<Raster, AnalysisError> {
        let cloud_cover = self.cloud_cover_for(date);
        if cloud_cover > self.max_cloud_cover {
            return Err(AnalysisError::NoDataAvailable(format!(
                "scene for {} has {:.1}% cloud cover, limit is {:.1}%",
                date, cloud_cover, self.max_cloud_cover
            )));
        }

        tracing::debug!(
            date = %date,
            cloud_cover,
            width = self.width,
            height = self.height,
            "Rendering synthetic scene"
        );

        let source = self.clone();
        tokio::task::spawn_blocking(move || source.render(date))
            .await
            .map_err(|e| AnalysisError::Internal(format!("scene render task failed: {}", e)))?
    }

    async fn available_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AvailableDate>, AnalysisError> {
        let mut dates = Vec::new();
        let mut date = first_revisit_on_or_after(start);
        while date < end {
            dates.push(AvailableDate {
                date,
                cloud_cover: self.cloud_cover_for(date),
                cached: false,
            });
            date += Duration::days(REVISIT_DAYS);
        }
        Ok(dates)
    }
}
