//! Area-of-interest polygon
//!
//! Loaded once per process from a JSON file:
//!
//! ```json
//! {
//!   "name": "Shankar SF",
//!   "crs": "EPSG:32643",
//!   "exterior": [[x, y], [x, y], ...],
//!   "holes": [[[x, y], ...]]
//! }
//! ```
//!
//! Coordinates share the projected CRS of the imagery. Rings may be open or
//! closed; containment uses the even-odd rule across all rings so holes are
//! excluded from the area of interest.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::raster::Extent;
use crate::error::AnalysisError;

/// A vertex in map coordinates
pub type Point = [f64; 2];

/// Polygon boundary with optional holes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub crs: Option<String>,
    pub exterior: Vec<Point>,
    #[serde(default)]
    pub holes: Vec<Vec<Point>>,
}

impl Boundary {
    /// Build a boundary from an exterior ring without holes
    pub fn new(exterior: Vec<Point>) -> Result<Self, AnalysisError> {
        let boundary = Self {
            name: None,
            crs: None,
            exterior,
            holes: Vec::new(),
        };
        boundary.validate()?;
        Ok(boundary)
    }

    /// Add an interior ring
    pub fn with_hole(mut self, hole: Vec<Point>) -> Result<Self, AnalysisError> {
        self.holes.push(hole);
        self.validate()?;
        Ok(self)
    }

    /// Parse and validate a boundary document
    pub fn from_json_str(json: &str) -> Result<Self, AnalysisError> {
        let boundary: Boundary = serde_json::from_str(json)
            .map_err(|e| AnalysisError::InvalidInput(format!("Invalid boundary file: {}", e)))?;
        boundary.validate()?;
        Ok(boundary)
    }

    /// Load a boundary document from disk
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::InvalidInput(format!(
                "Cannot read boundary file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&content)
    }

    fn validate(&self) -> Result<(), AnalysisError> {
        let rings = std::iter::once(&self.exterior).chain(self.holes.iter());
        for ring in rings {
            if open_ring(ring).len() < 3 {
                return Err(AnalysisError::InvalidInput(
                    "Boundary rings need at least 3 distinct vertices".to_string(),
                ));
            }
            if ring.iter().flatten().any(|v| !v.is_finite()) {
                return Err(AnalysisError::InvalidInput(
                    "Boundary coordinates must be finite".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Rings in drawing order: exterior first, then holes
    pub fn rings(&self) -> impl Iterator<Item = &[Point]> {
        std::iter::once(self.exterior.as_slice()).chain(self.holes.iter().map(Vec::as_slice))
    }

    /// Bounding box of the exterior ring
    pub fn bbox(&self) -> Extent {
        let mut extent = Extent::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for [x, y] in &self.exterior {
            extent.min_x = extent.min_x.min(*x);
            extent.min_y = extent.min_y.min(*y);
            extent.max_x = extent.max_x.max(*x);
            extent.max_y = extent.max_y.max(*y);
        }
        extent
    }

    /// Polygon area in square map units, holes subtracted
    pub fn area(&self) -> f64 {
        let holes: f64 = self.holes.iter().map(|h| ring_area(h)).sum();
        (ring_area(&self.exterior) - holes).max(0.0)
    }

    /// Area-weighted centroid of the exterior ring
    pub fn centroid(&self) -> Point {
        let ring = open_ring(&self.exterior);
        let n = ring.len();
        let mut cx = 0.0;
        let mut cy = 0.0;
        let mut signed_area = 0.0;

        for i in 0..n {
            let [x0, y0] = ring[i];
            let [x1, y1] = ring[(i + 1) % n];
            let cross = x0 * y1 - x1 * y0;
            signed_area += cross;
            cx += (x0 + x1) * cross;
            cy += (y0 + y1) * cross;
        }

        if signed_area.abs() < f64::EPSILON {
            let (sx, sy) = ring
                .iter()
                .fold((0.0, 0.0), |(sx, sy), [x, y]| (sx + x, sy + y));
            return [sx / n as f64, sy / n as f64];
        }

        signed_area *= 0.5;
        [cx / (6.0 * signed_area), cy / (6.0 * signed_area)]
    }

    /// Whether a map point lies inside the polygon and outside every hole
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.rings()
            .filter(|ring| crosses_odd(ring, x, y))
            .count()
            % 2
            == 1
    }
}

/// Drop the closing vertex if the ring repeats its first point
fn open_ring(ring: &[Point]) -> &[Point] {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

/// Unsigned shoelace area of a ring
fn ring_area(ring: &[Point]) -> f64 {
    let ring = open_ring(ring);
    let n = ring.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let [x0, y0] = ring[i];
            let [x1, y1] = ring[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum();
    twice.abs() * 0.5
}

/// Ray-casting parity test for one ring
fn crosses_odd(ring: &[Point], x: f64, y: f64) -> bool {
    let ring = open_ring(ring);
    let n = ring.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}
