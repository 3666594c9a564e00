//! Display and highlight image rendering
//!
//! Images share the pixel grid of the aligned rasters, one image pixel per
//! raster pixel.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};

use crate::error::AnalysisError;
use crate::models::{
    Boundary, GeoTransform, Mask, Point, ProbabilityMap, Raster, Severity, SeverityThresholds,
    BAND_BLUE, BAND_GREEN, BAND_RED,
};
use crate::services::metrics_engine::severity_grid;

const STRETCH_LOW_PERCENTILE: f64 = 1.0;
const STRETCH_HIGH_PERCENTILE: f64 = 99.0;
const DISPLAY_GAMMA: f32 = 1.3;

/// Overlay colour with its blend opacity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlay {
    pub colour: [u8; 3],
    pub alpha: f32,
}

/// Colours used by [`Visualizer::render`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub confirmed: Overlay,
    pub possible: Overlay,
    pub intact: Overlay,
    pub outline: [u8; 3],
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            confirmed: Overlay {
                colour: [255, 0, 0],
                alpha: 0.6,
            },
            possible: Overlay {
                colour: [255, 255, 0],
                alpha: 0.5,
            },
            intact: Overlay {
                colour: [0, 255, 0],
                alpha: 0.3,
            },
            outline: [255, 255, 255],
        }
    }
}

impl Palette {
    fn overlay(&self, severity: Severity) -> &Overlay {
        match severity {
            Severity::Confirmed => &self.confirmed,
            Severity::Possible => &self.possible,
            Severity::Intact => &self.intact,
        }
    }
}

/// Highlight renderer
#[derive(Debug, Clone, Default)]
pub struct Visualizer {
    palette: Palette,
    thresholds: SeverityThresholds,
}

impl Visualizer {
    pub fn new(thresholds: SeverityThresholds) -> Self {
        Self {
            palette: Palette::default(),
            thresholds,
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    /// Severity-coloured composite over the after image
    ///
    /// Pixels inside the footprint are alpha-blended with their severity
    /// colour. The boundary outline is drawn last, opaque, so it overwrites
    /// whatever classification lies beneath it. `before` must share the frame
    /// of `after`.
    pub fn render(
        &self,
        before: &RgbImage,
        after: &RgbImage,
        probability: &ProbabilityMap,
        mask: &Mask,
        boundary: &Boundary,
        transform: &GeoTransform,
    ) -> Result<RgbImage, AnalysisError> {
        let (width, height) = (probability.width(), probability.height());
        let frame = (width as u32, height as u32);
        if after.dimensions() != frame
            || before.dimensions() != frame
            || mask.width() != width
            || mask.height() != height
        {
            return Err(AnalysisError::Internal(format!(
                "render inputs disagree: before {:?}, after {:?}, mask {}x{}, probability {}x{}",
                before.dimensions(),
                after.dimensions(),
                mask.width(),
                mask.height(),
                width,
                height
            )));
        }

        let severities = severity_grid(probability, &self.thresholds);
        let mut image = after.clone();

        for (index, severity) in severities.iter().enumerate() {
            let Some(severity) = severity else { continue };
            let overlay = self.palette.overlay(*severity);
            let (x, y) = ((index % width) as u32, (index / width) as u32);
            let pixel = image.get_pixel_mut(x, y);
            *pixel = blend(*pixel, overlay);
        }

        for (ring_index, ring) in boundary.rings().enumerate() {
            // Exterior three pixels wide, holes one
            let brush = if ring_index == 0 { 1 } else { 0 };
            draw_ring(&mut image, ring, transform, brush, self.palette.outline);
        }

        Ok(image)
    }
}

fn blend(base: Rgb<u8>, overlay: &Overlay) -> Rgb<u8> {
    let mix = |b: u8, o: u8| -> u8 {
        ((1.0 - overlay.alpha) * b as f32 + overlay.alpha * o as f32)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    Rgb([
        mix(base[0], overlay.colour[0]),
        mix(base[1], overlay.colour[1]),
        mix(base[2], overlay.colour[2]),
    ])
}

/// Pixels of the polyline through `ring` (closed), in image coordinates
pub fn outline_pixels(ring: &[Point], transform: &GeoTransform) -> Vec<(i64, i64)> {
    let to_pixel = |[x, y]: Point| {
        let (col, row) = transform.to_pixel(x, y);
        (col.floor() as i64, row.floor() as i64)
    };

    let mut pixels = Vec::new();
    for (i, start) in ring.iter().enumerate() {
        let end = ring[(i + 1) % ring.len()];
        pixels.extend(bresenham(to_pixel(*start), to_pixel(end)));
    }
    pixels
}

fn draw_ring(image: &mut RgbImage, ring: &[Point], transform: &GeoTransform, brush: i64, colour: [u8; 3]) {
    let (width, height) = (image.width() as i64, image.height() as i64);
    for (col, row) in outline_pixels(ring, transform) {
        for dy in -brush..=brush {
            for dx in -brush..=brush {
                let (x, y) = (col + dx, row + dy);
                if x >= 0 && y >= 0 && x < width && y < height {
                    image.put_pixel(x as u32, y as u32, Rgb(colour));
                }
            }
        }
    }
}

/// Integer line from `a` to `b`, both ends included
fn bresenham(a: (i64, i64), b: (i64, i64)) -> Vec<(i64, i64)> {
    let (mut x, mut y) = a;
    let dx = (b.0 - x).abs();
    let dy = -(b.1 - y).abs();
    let sx = if x < b.0 { 1 } else { -1 };
    let sy = if y < b.1 { 1 } else { -1 };
    let mut err = dx + dy;
    let mut points = Vec::with_capacity((dx - dy) as usize + 1);

    loop {
        points.push((x, y));
        if (x, y) == b {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    points
}

/// Linear-interpolated percentile of sorted values
fn percentile(sorted: &[f32], pct: f64) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = (rank - lower as f64) as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// True-colour display image of a raster
///
/// Each of R, G, B is stretched between its 1st and 99th percentile over
/// valid pixels, then brightened with gamma 1/1.3. No-data stays black.
pub fn true_colour(raster: &Raster) -> Result<RgbImage, AnalysisError> {
    let pixels = raster.width() * raster.height();
    let valid: Vec<bool> = (0..pixels).map(|i| raster.is_valid(i)).collect();

    let mut channels = Vec::with_capacity(3);
    for band_index in [BAND_RED, BAND_GREEN, BAND_BLUE] {
        let band = raster.band(band_index).ok_or_else(|| {
            AnalysisError::Internal(format!("raster has no band {}", band_index))
        })?;

        let mut sorted: Vec<f32> = band
            .iter()
            .zip(&valid)
            .filter_map(|(v, ok)| ok.then_some(*v))
            .collect();
        sorted.sort_by(f32::total_cmp);
        let low = percentile(&sorted, STRETCH_LOW_PERCENTILE);
        let high = percentile(&sorted, STRETCH_HIGH_PERCENTILE);
        let range = high - low;

        let channel: Vec<u8> = band
            .iter()
            .zip(&valid)
            .map(|(v, ok)| {
                if !ok {
                    return 0;
                }
                let unit = if range > 0.0 {
                    (v - low) / range
                } else {
                    v / (high + 1e-6)
                };
                (unit.clamp(0.0, 1.0).powf(1.0 / DISPLAY_GAMMA) * 255.0).round() as u8
            })
            .collect();
        channels.push(channel);
    }

    let mut buffer = Vec::with_capacity(pixels * 3);
    for i in 0..pixels {
        buffer.extend(channels.iter().map(|c| c[i]));
    }

    RgbImage::from_raw(raster.width() as u32, raster.height() as u32, buffer)
        .ok_or_else(|| AnalysisError::Internal("display buffer size mismatch".to_string()))
}

/// Encode an RGB image as PNG bytes
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, AnalysisError> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| AnalysisError::Output(format!("PNG encoding failed: {}", e)))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NODATA;

    fn grey(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([100, 100, 100]))
    }

    /// Boundary whose outline runs through pixel centres of an 8x8 grid
    fn setup() -> (Boundary, GeoTransform) {
        let transform = GeoTransform::new(0.0, 80.0, 10.0, 10.0);
        let boundary = Boundary::new(vec![[5.0, 5.0], [75.0, 5.0], [75.0, 75.0], [5.0, 75.0]]).unwrap();
        (boundary, transform)
    }

    #[test]
    fn test_bresenham_includes_endpoints() {
        assert_eq!(bresenham((0, 0), (3, 0)), vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
        assert_eq!(bresenham((0, 0), (2, 2)), vec![(0, 0), (1, 1), (2, 2)]);
        assert_eq!(bresenham((2, 1), (2, 1)), vec![(2, 1)]);
    }

    #[test]
    fn test_outline_drawn_over_confirmed_change() {
        let (boundary, transform) = setup();
        let map = ProbabilityMap::new(8, 8, vec![0.95; 64]).unwrap();
        let mask = Mask::new(8, 8, vec![true; 64]).unwrap();
        let image = Visualizer::default()
            .render(&grey(8, 8), &grey(8, 8), &map, &mask, &boundary, &transform)
            .unwrap();

        // Outline corner stays white even though it is confirmed loss
        assert_eq!(*image.get_pixel(0, 0), Rgb([255, 255, 255]));
        // Interior pixel away from the outline is blended red
        assert_eq!(*image.get_pixel(4, 4), Rgb([193, 40, 40]));
    }

    #[test]
    fn test_severity_colours_blend() {
        let (_, transform) = setup();
        let tiny = Boundary::new(vec![[200.0, 200.0], [210.0, 200.0], [210.0, 210.0]]).unwrap();
        let map = ProbabilityMap::new(3, 1, vec![0.1, 0.5, 0.9]).unwrap();
        let mask = Mask::from_rows(&[&[false, true, true]]).unwrap();
        let image = Visualizer::default()
            .render(&grey(3, 1), &grey(3, 1), &map, &mask, &tiny, &transform)
            .unwrap();

        let intact = image.get_pixel(0, 0);
        assert_eq!(intact[0], 70);
        assert_eq!(intact[0], intact[2]);
        assert!(intact[1] > 140);
        assert_eq!(*image.get_pixel(1, 0), Rgb([178, 178, 50]));
        assert_eq!(*image.get_pixel(2, 0), Rgb([193, 40, 40]));
    }

    #[test]
    fn test_confirmed_colour_without_mask() {
        let (_, transform) = setup();
        let far = Boundary::new(vec![[500.0, 500.0], [510.0, 500.0], [510.0, 510.0]]).unwrap();
        let map = ProbabilityMap::new(1, 1, vec![0.75]).unwrap();
        let image = Visualizer::default()
            .render(&grey(1, 1), &grey(1, 1), &map, &Mask::empty(1, 1), &far, &transform)
            .unwrap();
        assert_eq!(*image.get_pixel(0, 0), Rgb([193, 40, 40]));
    }

    #[test]
    fn test_outside_footprint_left_untouched() {
        let (_, transform) = setup();
        let far = Boundary::new(vec![[500.0, 500.0], [510.0, 500.0], [510.0, 510.0]]).unwrap();
        let map = ProbabilityMap::with_footprint(2, 1, vec![0.9, 0.9], vec![false, true]).unwrap();
        let mask = Mask::from_rows(&[&[false, true]]).unwrap();
        let image = Visualizer::default()
            .render(&grey(2, 1), &grey(2, 1), &map, &mask, &far, &transform)
            .unwrap();
        assert_eq!(*image.get_pixel(0, 0), Rgb([100, 100, 100]));
    }

    #[test]
    fn test_mismatched_frames_rejected() {
        let (boundary, transform) = setup();
        let map = ProbabilityMap::new(8, 8, vec![0.0; 64]).unwrap();
        let mask = Mask::empty(8, 8);
        let result = Visualizer::default().render(
            &grey(8, 8),
            &grey(4, 4),
            &map,
            &mask,
            &boundary,
            &transform,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_true_colour_stretch_and_nodata() {
        let n = 100;
        let ramp: Vec<f32> = (0..n).map(|i| i as f32 / 100.0).collect();
        let mut bands = vec![ramp.clone(), ramp.clone(), ramp.clone(), ramp];
        for band in bands.iter_mut() {
            band[0] = NODATA;
        }
        let raster = Raster::new(
            10,
            10,
            bands,
            GeoTransform::new(0.0, 100.0, 10.0, 10.0),
            "EPSG:32643",
        )
        .unwrap();

        let image = true_colour(&raster).unwrap();
        assert_eq!(image.dimensions(), (10, 10));
        assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(9, 9), Rgb([255, 255, 255]));
        let mid = image.get_pixel(5, 5)[0];
        assert!(mid > 128, "gamma brightens mid-tones, got {}", mid);
    }

    #[test]
    fn test_png_signature() {
        let bytes = encode_png(&grey(2, 2)).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
