//! Patch extraction and forest-loss metrics
//!
//! Thresholds a probability map into a change mask, labels connected
//! components with an explicit stack (row-major discovery, so labelling is
//! deterministic) and aggregates areas. Every area derives from pixel counts
//! times the same per-pixel area, so
//! `deforested = Σ patch areas` and `intact + deforested = total` hold.

use fw_common::config::{AnalysisConfig, Connectivity};

use crate::error::AnalysisError;
use crate::models::{
    Mask, Metrics, Patch, PixelBounds, ProbabilityMap, Severity, SeverityThresholds,
    M2_PER_HECTARE,
};

const FOUR_NEIGHBOURS: [(i64, i64); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];
const EIGHT_NEIGHBOURS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Thresholds and policies for one analysis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsParams {
    /// A pixel is changed iff probability >= threshold
    pub threshold: f32,
    pub severity: SeverityThresholds,
    pub connectivity: Connectivity,
    /// Components below this size are removed (0 keeps all)
    pub min_patch_pixels: usize,
}

impl Default for MetricsParams {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            severity: SeverityThresholds::default(),
            connectivity: Connectivity::Eight,
            min_patch_pixels: 0,
        }
    }
}

impl From<&AnalysisConfig> for MetricsParams {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            threshold: config.deforestation_threshold,
            severity: SeverityThresholds {
                confirmed: config.confirmed_threshold,
                degradation: config.degradation_threshold,
            },
            connectivity: config.connectivity,
            min_patch_pixels: config.min_patch_pixels,
        }
    }
}

/// Output of [`analyze`]
#[derive(Debug, Clone, PartialEq)]
pub struct PatchAnalysis {
    /// Change mask after noise removal
    pub mask: Mask,
    /// Patches by descending area, ties in discovery order
    pub patches: Vec<Patch>,
    pub metrics: Metrics,
}

/// One connected component, pixel indices in discovery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub pixels: Vec<usize>,
}

/// Changed pixels: inside the footprint with probability >= `threshold`
pub fn threshold_mask(probability: &ProbabilityMap, threshold: f32) -> Mask {
    let cells = probability
        .values()
        .iter()
        .zip(probability.footprint())
        .map(|(p, inside)| *inside && *p >= threshold)
        .collect();
    Mask::new(probability.width(), probability.height(), cells)
        .unwrap_or_else(|_| Mask::empty(probability.width(), probability.height()))
}

/// Connected components of the true cells of `mask`
///
/// Seeds are taken in row-major order and flooded with an explicit stack, so
/// the result does not depend on recursion depth and is reproducible.
pub fn label_components(mask: &Mask, connectivity: Connectivity) -> Vec<Component> {
    let (width, height) = (mask.width(), mask.height());
    let cells = mask.cells();
    let neighbours: &[(i64, i64)] = match connectivity {
        Connectivity::Four => &FOUR_NEIGHBOURS,
        Connectivity::Eight => &EIGHT_NEIGHBOURS,
    };

    let mut visited = vec![false; cells.len()];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for seed in 0..cells.len() {
        if !cells[seed] || visited[seed] {
            continue;
        }

        let mut pixels = Vec::new();
        visited[seed] = true;
        stack.push(seed);

        while let Some(index) = stack.pop() {
            pixels.push(index);
            let col = (index % width) as i64;
            let row = (index / width) as i64;

            for (dx, dy) in neighbours {
                let (c, r) = (col + dx, row + dy);
                if c < 0 || r < 0 || c >= width as i64 || r >= height as i64 {
                    continue;
                }
                let neighbour = r as usize * width + c as usize;
                if cells[neighbour] && !visited[neighbour] {
                    visited[neighbour] = true;
                    stack.push(neighbour);
                }
            }
        }

        components.push(Component { pixels });
    }

    components
}

/// Per-pixel severity for rendering; `None` outside the footprint
///
/// Classified from the probability alone, independent of the change mask.
pub fn severity_grid(
    probability: &ProbabilityMap,
    thresholds: &SeverityThresholds,
) -> Vec<Option<Severity>> {
    probability
        .values()
        .iter()
        .zip(probability.footprint())
        .map(|(p, inside)| inside.then(|| thresholds.classify(*p)))
        .collect()
}

/// Threshold, extract patches and aggregate metrics
pub fn analyze(
    probability: &ProbabilityMap,
    resolution_x: f64,
    resolution_y: f64,
    params: &MetricsParams,
) -> Result<PatchAnalysis, AnalysisError> {
    if !(resolution_x.is_finite() && resolution_y.is_finite())
        || resolution_x <= 0.0
        || resolution_y <= 0.0
    {
        return Err(AnalysisError::Internal(format!(
            "pixel resolution must be positive, got {}x{}",
            resolution_x, resolution_y
        )));
    }

    let width = probability.width();
    let pixel_area = resolution_x * resolution_y;
    let mut mask = threshold_mask(probability, params.threshold);
    let mut components = label_components(&mask, params.connectivity);

    if params.min_patch_pixels > 0 {
        let before = components.len();
        components.retain(|component| {
            let keep = component.pixels.len() >= params.min_patch_pixels;
            if !keep {
                for &index in &component.pixels {
                    mask.set(index, false);
                }
            }
            keep
        });
        tracing::debug!(
            removed = before - components.len(),
            min_patch_pixels = params.min_patch_pixels,
            "Removed small components"
        );
    }

    let mut patches: Vec<Patch> = components
        .iter()
        .enumerate()
        .map(|(i, component)| {
            let values = probability.values();
            let mut bounds = PixelBounds {
                min_col: usize::MAX,
                min_row: usize::MAX,
                max_col: 0,
                max_row: 0,
            };
            let mut sum = 0.0f64;
            for &index in &component.pixels {
                let (col, row) = (index % width, index / width);
                bounds.min_col = bounds.min_col.min(col);
                bounds.min_row = bounds.min_row.min(row);
                bounds.max_col = bounds.max_col.max(col);
                bounds.max_row = bounds.max_row.max(row);
                sum += values[index] as f64;
            }

            let pixel_count = component.pixels.len();
            let mean_probability = (sum / pixel_count as f64) as f32;
            Patch {
                label: i as u32 + 1,
                pixel_count,
                area_m2: pixel_count as f64 * pixel_area,
                mean_probability,
                severity: params.severity.classify(mean_probability),
                bounds,
            }
        })
        .collect();

    // Stable: equal areas keep discovery order
    patches.sort_by(|a, b| b.area_m2.total_cmp(&a.area_m2));

    let total_pixels = probability.footprint_pixels();
    let total_area_m2 = total_pixels as f64 * pixel_area;
    let deforested_area_m2: f64 = patches.iter().map(|p| p.area_m2).sum();
    let deforested_pixels: usize = patches.iter().map(|p| p.pixel_count).sum();
    let largest_patch_m2 = patches.first().map_or(0.0, |p| p.area_m2);
    let intact_forest_m2 = total_area_m2 - deforested_area_m2;
    let forest_loss_percentage = if total_area_m2 > 0.0 {
        (100.0 * deforested_area_m2 / total_area_m2).clamp(0.0, 100.0)
    } else {
        0.0
    };

    let metrics = Metrics {
        total_area_m2,
        total_area_hectares: total_area_m2 / M2_PER_HECTARE,
        deforested_area_m2,
        deforested_area_hectares: deforested_area_m2 / M2_PER_HECTARE,
        forest_loss_percentage,
        number_of_patches: patches.len(),
        largest_patch_m2,
        largest_patch_hectares: largest_patch_m2 / M2_PER_HECTARE,
        intact_forest_m2,
        intact_forest_hectares: intact_forest_m2 / M2_PER_HECTARE,
        pixel_size_meters: resolution_x,
        total_pixels,
        deforested_pixels,
        boundary_polygon_area_m2: None,
    };

    Ok(PatchAnalysis {
        mask,
        patches,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_from_mask(rows: &[&[bool]]) -> ProbabilityMap {
        let mask = Mask::from_rows(rows).unwrap();
        let values = mask.cells().iter().map(|c| if *c { 0.9 } else { 0.1 }).collect();
        ProbabilityMap::new(mask.width(), mask.height(), values).unwrap()
    }

    const T: bool = true;
    const F: bool = false;

    #[test]
    fn test_single_block_is_one_patch_of_400_m2() {
        let map = map_from_mask(&[
            &[F, F, F, F],
            &[F, T, T, F],
            &[F, T, T, F],
            &[F, F, F, F],
        ]);
        let result = analyze(&map, 10.0, 10.0, &MetricsParams::default()).unwrap();

        assert_eq!(result.patches.len(), 1);
        assert_eq!(result.patches[0].area_m2, 400.0);
        assert_eq!(result.patches[0].pixel_count, 4);
        assert_eq!(
            result.patches[0].bounds,
            PixelBounds {
                min_col: 1,
                min_row: 1,
                max_col: 2,
                max_row: 2
            }
        );
        assert_eq!(result.metrics.deforested_area_m2, 400.0);
        assert_eq!(result.metrics.total_area_m2, 1600.0);
        assert_eq!(result.metrics.forest_loss_percentage, 25.0);
    }

    #[test]
    fn test_diagonal_pixels_join_under_eight_connectivity() {
        let map = map_from_mask(&[&[T, F], &[F, T]]);

        let eight = analyze(&map, 10.0, 10.0, &MetricsParams::default()).unwrap();
        assert_eq!(eight.patches.len(), 1);
        assert_eq!(eight.patches[0].pixel_count, 2);

        let params = MetricsParams {
            connectivity: Connectivity::Four,
            ..MetricsParams::default()
        };
        let four = analyze(&map, 10.0, 10.0, &params).unwrap();
        assert_eq!(four.patches.len(), 2);
    }

    #[test]
    fn test_all_false_mask_has_no_patches() {
        let map = ProbabilityMap::new(5, 5, vec![0.1; 25]).unwrap();
        let result = analyze(&map, 10.0, 10.0, &MetricsParams::default()).unwrap();

        assert_eq!(result.metrics.number_of_patches, 0);
        assert_eq!(result.metrics.deforested_area_m2, 0.0);
        assert_eq!(result.metrics.largest_patch_m2, 0.0);
        assert_eq!(result.metrics.intact_forest_m2, result.metrics.total_area_m2);
        assert_eq!(result.mask.count(), 0);
    }

    #[test]
    fn test_all_true_mask_is_one_patch_covering_everything() {
        let map = ProbabilityMap::new(6, 4, vec![0.8; 24]).unwrap();
        let result = analyze(&map, 10.0, 10.0, &MetricsParams::default()).unwrap();

        assert_eq!(result.patches.len(), 1);
        assert_eq!(result.patches[0].area_m2, result.metrics.total_area_m2);
        assert_eq!(result.metrics.forest_loss_percentage, 100.0);
        assert_eq!(result.metrics.intact_forest_m2, 0.0);
    }

    #[test]
    fn test_area_invariants_hold_with_uneven_resolution() {
        let map = map_from_mask(&[
            &[T, T, F, F, T],
            &[F, F, F, F, T],
            &[T, F, T, F, F],
            &[F, F, T, T, F],
        ]);
        let result = analyze(&map, 10.5, 9.75, &MetricsParams::default()).unwrap();
        let m = &result.metrics;

        let patch_sum: f64 = result.patches.iter().map(|p| p.area_m2).sum();
        assert_eq!(m.deforested_area_m2, patch_sum);
        assert!((m.intact_forest_m2 + m.deforested_area_m2 - m.total_area_m2).abs() < 1e-9);
        assert!((0.0..=100.0).contains(&m.forest_loss_percentage));
        assert!(
            (m.forest_loss_percentage - 100.0 * m.deforested_area_m2 / m.total_area_m2).abs()
                < 1e-12
        );
        assert_eq!(m.deforested_pixels, result.mask.count());
    }

    #[test]
    fn test_patches_sorted_by_area_with_stable_ties() {
        let map = map_from_mask(&[
            &[T, F, T, T, F],
            &[F, F, T, T, F],
            &[F, F, F, F, F],
            &[T, F, F, F, T],
        ]);
        let result = analyze(&map, 10.0, 10.0, &MetricsParams::default()).unwrap();
        let areas: Vec<f64> = result.patches.iter().map(|p| p.area_m2).collect();
        assert_eq!(areas, vec![400.0, 100.0, 100.0, 100.0]);

        let labels: Vec<u32> = result.patches.iter().map(|p| p.label).collect();
        assert_eq!(labels, vec![2, 1, 3, 4]);
        assert_eq!(result.metrics.largest_patch_m2, 400.0);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let values: Vec<f32> = (0..100).map(|i| ((i * 37) % 100) as f32 / 100.0).collect();
        let map = ProbabilityMap::new(10, 10, values).unwrap();
        let first = analyze(&map, 10.0, 10.0, &MetricsParams::default()).unwrap();
        for _ in 0..5 {
            assert_eq!(analyze(&map, 10.0, 10.0, &MetricsParams::default()).unwrap(), first);
        }
    }

    #[test]
    fn test_mean_probability_and_severity() {
        let map = ProbabilityMap::new(3, 1, vec![0.6, 0.9, 0.1]).unwrap();
        let result = analyze(&map, 10.0, 10.0, &MetricsParams::default()).unwrap();
        let patch = &result.patches[0];
        assert!((patch.mean_probability - 0.75).abs() < 1e-6);
        assert_eq!(patch.severity, Severity::Confirmed);
    }

    #[test]
    fn test_footprint_limits_total_area_and_change() {
        let map = ProbabilityMap::with_footprint(
            2,
            2,
            vec![0.9, 0.9, 0.9, 0.9],
            vec![true, true, true, false],
        )
        .unwrap();
        let result = analyze(&map, 10.0, 10.0, &MetricsParams::default()).unwrap();
        assert_eq!(result.metrics.total_pixels, 3);
        assert_eq!(result.metrics.total_area_m2, 300.0);
        assert_eq!(result.metrics.deforested_area_m2, 300.0);
        assert!(!result.mask.get(1, 1));
    }

    #[test]
    fn test_min_patch_pixels_removes_specks() {
        let map = map_from_mask(&[&[T, F, F, F], &[F, F, T, T], &[F, F, T, T]]);
        let params = MetricsParams {
            min_patch_pixels: 2,
            ..MetricsParams::default()
        };
        let result = analyze(&map, 10.0, 10.0, &params).unwrap();
        assert_eq!(result.patches.len(), 1);
        assert_eq!(result.patches[0].label, 1);
        assert!(!result.mask.get(0, 0));
        assert_eq!(result.mask.count(), 4);
        assert_eq!(result.metrics.deforested_area_m2, 400.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let map = ProbabilityMap::new(2, 1, vec![0.5, 0.49]).unwrap();
        let mask = threshold_mask(&map, 0.5);
        assert_eq!(mask.cells(), &[true, false]);
    }

    #[test]
    fn test_severity_grid_ignores_change_mask() {
        let map = ProbabilityMap::with_footprint(
            4,
            1,
            vec![0.75, 0.9, 0.5, 0.2],
            vec![true, true, true, false],
        )
        .unwrap();
        let params = MetricsParams {
            threshold: 0.8,
            ..MetricsParams::default()
        };
        let result = analyze(&map, 10.0, 10.0, &params).unwrap();
        assert!(!result.mask.get(0, 0));

        let grid = severity_grid(&map, &SeverityThresholds::default());
        assert_eq!(
            grid,
            vec![
                Some(Severity::Confirmed),
                Some(Severity::Confirmed),
                Some(Severity::Possible),
                None
            ]
        );
    }

    #[test]
    fn test_non_positive_resolution_rejected() {
        let map = ProbabilityMap::new(1, 1, vec![0.9]).unwrap();
        assert!(analyze(&map, 0.0, 10.0, &MetricsParams::default()).is_err());
    }
}
