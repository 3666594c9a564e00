//! Boundary clipping
//!
//! Crops a raster to the window covering the boundary's bounding box, then
//! writes [`NODATA`] into every band of each pixel whose centre falls outside
//! the polygon (or inside a hole).

use crate::error::AnalysisError;
use crate::models::{Boundary, GeoTransform, Raster, NODATA};

/// Restrict `raster` to the area of interest
///
/// Fails with `DisjointGeometry` when the boundary and raster share no area,
/// or when no pixel centre of the overlap lies inside the polygon.
pub fn clip(raster: &Raster, boundary: &Boundary) -> Result<Raster, AnalysisError> {
    let extent = raster.extent();
    let overlap = extent.intersection(&boundary.bbox()).ok_or_else(|| {
        AnalysisError::DisjointGeometry(format!(
            "raster extent ({:.1}, {:.1})-({:.1}, {:.1}) does not overlap the boundary",
            extent.min_x, extent.min_y, extent.max_x, extent.max_y
        ))
    })?;

    let t = raster.transform();
    let col_start = ((overlap.min_x - t.origin_x) / t.resolution_x).floor().max(0.0) as usize;
    let col_end = (((overlap.max_x - t.origin_x) / t.resolution_x).ceil() as usize).min(raster.width());
    let row_start = ((t.origin_y - overlap.max_y) / t.resolution_y).floor().max(0.0) as usize;
    let row_end =
        (((t.origin_y - overlap.min_y) / t.resolution_y).ceil() as usize).min(raster.height());

    if col_start >= col_end || row_start >= row_end {
        return Err(AnalysisError::DisjointGeometry(
            "boundary overlap is smaller than one pixel".to_string(),
        ));
    }

    let width = col_end - col_start;
    let height = row_end - row_start;
    let transform = GeoTransform::new(
        t.origin_x + col_start as f64 * t.resolution_x,
        t.origin_y - row_start as f64 * t.resolution_y,
        t.resolution_x,
        t.resolution_y,
    );

    let inside: Vec<bool> = (0..height)
        .flat_map(|row| (0..width).map(move |col| (col, row)))
        .map(|(col, row)| {
            let (x, y) = transform.pixel_center(col, row);
            boundary.contains(x, y)
        })
        .collect();

    let inside_count = inside.iter().filter(|i| **i).count();
    if inside_count == 0 {
        return Err(AnalysisError::DisjointGeometry(
            "no pixel centre lies inside the boundary".to_string(),
        ));
    }

    let bands = raster
        .bands()
        .iter()
        .map(|band| {
            let mut out = Vec::with_capacity(width * height);
            for row in 0..height {
                let start = (row_start + row) * raster.width() + col_start;
                out.extend_from_slice(&band[start..start + width]);
            }
            for (sample, keep) in out.iter_mut().zip(&inside) {
                if !keep {
                    *sample = NODATA;
                }
            }
            out
        })
        .collect();

    tracing::debug!(
        width,
        height,
        inside_pixels = inside_count,
        "Clipped raster to boundary"
    );

    raster.with_bands(width, height, bands, transform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Extent, Point};

    /// 10x10 raster, 10 m pixels, covering (0,0)-(100,100)
    fn raster() -> Raster {
        let values: Vec<f32> = (0..100).map(|i| i as f32).collect();
        Raster::new(
            10,
            10,
            vec![values.clone(), values],
            GeoTransform::new(0.0, 100.0, 10.0, 10.0),
            "EPSG:32643",
        )
        .unwrap()
        .with_cloud_cover(4.5)
    }

    fn square(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<Point> {
        vec![[min_x, min_y], [max_x, min_y], [max_x, max_y], [min_x, max_y]]
    }

    #[test]
    fn test_crops_to_bounding_window() {
        let boundary = Boundary::new(square(20.0, 30.0, 60.0, 70.0)).unwrap();
        let clipped = clip(&raster(), &boundary).unwrap();

        assert_eq!((clipped.width(), clipped.height()), (4, 4));
        assert_eq!(clipped.extent(), Extent::new(20.0, 30.0, 60.0, 70.0));
        // Row 3 (y 60..70), col 2 of the source
        assert_eq!(clipped.band(0).unwrap()[0], 32.0);
        assert_eq!(clipped.valid_pixel_count(), 16);
        assert_eq!(clipped.cloud_cover(), Some(4.5));
    }

    #[test]
    fn test_outside_polygon_becomes_nodata() {
        let triangle = vec![[0.0, 0.0], [100.0, 0.0], [0.0, 100.0]];
        let boundary = Boundary::new(triangle).unwrap();
        let clipped = clip(&raster(), &boundary).unwrap();

        assert_eq!((clipped.width(), clipped.height()), (10, 10));
        // Top-right corner is outside the triangle
        let corner = clipped.index(9, 0);
        assert!(!clipped.is_valid(corner));
        assert!(clipped.bands().iter().all(|b| b[corner] == NODATA));
        // Bottom-left corner is inside
        assert!(clipped.is_valid(clipped.index(0, 9)));
        assert!(clipped.valid_pixel_count() < 100);
    }

    #[test]
    fn test_hole_pixels_masked() {
        let boundary = Boundary::new(square(0.0, 0.0, 100.0, 100.0))
            .unwrap()
            .with_hole(square(40.0, 40.0, 60.0, 60.0))
            .unwrap();
        let clipped = clip(&raster(), &boundary).unwrap();
        assert_eq!(clipped.valid_pixel_count(), 96);
        assert!(!clipped.is_valid(clipped.index(4, 4)));
    }

    #[test]
    fn test_disjoint_boundary_rejected() {
        let boundary = Boundary::new(square(500.0, 500.0, 600.0, 600.0)).unwrap();
        let err = clip(&raster(), &boundary).unwrap_err();
        assert!(matches!(err, AnalysisError::DisjointGeometry(_)));
    }

    #[test]
    fn test_boundary_larger_than_raster_keeps_full_grid() {
        let boundary = Boundary::new(square(-50.0, -50.0, 150.0, 150.0)).unwrap();
        let clipped = clip(&raster(), &boundary).unwrap();
        assert_eq!((clipped.width(), clipped.height()), (10, 10));
        assert_eq!(clipped.valid_pixel_count(), 100);
    }
}
