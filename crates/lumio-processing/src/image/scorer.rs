//! Region scoring for smart crop
//!
//! A region's interest is a fixed blend of three sub-scores, each 0-100:
//! distance from the image border, mean saturation and closeness of mean
//! luminance to mid-grey.

use lumio_core::models::CropRegion;

pub const EDGE_WEIGHT: f64 = 0.3;
pub const SATURATION_WEIGHT: f64 = 0.4;
pub const BRIGHTNESS_WEIGHT: f64 = 0.3;

/// Distance from the border, in pixels, at which the edge score saturates.
pub const EDGE_CAP_PX: f64 = 50.0;

const CHANNELS: usize = 4;

/// Per-pixel saturation (HSV) and luminance, both in 0..=1.
#[inline]
fn pixel_stats(px: &[u8]) -> (f64, f64) {
    let (r, g, b) = (px[0] as f64, px[1] as f64, px[2] as f64);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let saturation = if max == 0.0 { 0.0 } else { (max - min) / max };
    let luminance = (0.299 * r + 0.587 * g + 0.114 * b) / 255.0;
    (saturation, luminance)
}

pub fn edge_score(image_width: u32, image_height: u32, region: &CropRegion, cap_px: f64) -> f64 {
    let left = region.x as f64;
    let top = region.y as f64;
    let right = image_width.saturating_sub(region.right()) as f64;
    let bottom = image_height.saturating_sub(region.bottom()) as f64;
    let nearest = left.min(top).min(right).min(bottom);
    if cap_px <= 0.0 {
        return 100.0;
    }
    nearest.min(cap_px) / cap_px * 100.0
}

pub fn saturation_score(mean_saturation: f64) -> f64 {
    (mean_saturation * 100.0).clamp(0.0, 100.0)
}

pub fn brightness_score(mean_luminance: f64) -> f64 {
    (100.0 - (mean_luminance - 0.5).abs() * 200.0).max(0.0)
}

fn combine(edge: f64, saturation: f64, brightness: f64) -> f64 {
    EDGE_WEIGHT * edge + SATURATION_WEIGHT * saturation + BRIGHTNESS_WEIGHT * brightness
}

/// Score one region of an RGBA8 buffer by walking its pixels.
///
/// Regions that do not fit the image score 0.
pub fn score(pixels: &[u8], image_width: u32, image_height: u32, region: &CropRegion) -> f64 {
    if !region.fits_within(image_width, image_height)
        || pixels.len() < image_width as usize * image_height as usize * CHANNELS
    {
        return 0.0;
    }

    let stride = image_width as usize * CHANNELS;
    let mut sat_sum = 0.0;
    let mut lum_sum = 0.0;
    for y in region.y..region.bottom() {
        let row = y as usize * stride;
        for x in region.x..region.right() {
            let i = row + x as usize * CHANNELS;
            let (s, l) = pixel_stats(&pixels[i..i + CHANNELS]);
            sat_sum += s;
            lum_sum += l;
        }
    }
    let area = region.width as f64 * region.height as f64;

    combine(
        edge_score(image_width, image_height, region, EDGE_CAP_PX),
        saturation_score(sat_sum / area),
        brightness_score(lum_sum / area),
    )
}

/// Summed-area tables over saturation and luminance, so every region scores
/// in constant time after one pass over the image.
pub struct RegionScorer {
    width: u32,
    height: u32,
    edge_cap_px: f64,
    saturation: Vec<f64>,
    luminance: Vec<f64>,
}

impl RegionScorer {
    /// Build from an RGBA8 buffer. A buffer shorter than `width * height * 4`
    /// is treated as black past its end.
    pub fn new(pixels: &[u8], width: u32, height: u32) -> Self {
        let cols = width as usize + 1;
        let rows = height as usize + 1;
        let mut saturation = vec![0.0; cols * rows];
        let mut luminance = vec![0.0; cols * rows];

        for y in 0..height as usize {
            let mut row_sat = 0.0;
            let mut row_lum = 0.0;
            for x in 0..width as usize {
                let i = (y * width as usize + x) * CHANNELS;
                if let Some(px) = pixels.get(i..i + CHANNELS) {
                    let (s, l) = pixel_stats(px);
                    row_sat += s;
                    row_lum += l;
                }
                let above = y * cols + x + 1;
                let here = (y + 1) * cols + x + 1;
                saturation[here] = saturation[above] + row_sat;
                luminance[here] = luminance[above] + row_lum;
            }
        }

        Self {
            width,
            height,
            edge_cap_px: EDGE_CAP_PX,
            saturation,
            luminance,
        }
    }

    /// Edge cap in this buffer's pixels, for buffers downscaled from the source.
    pub fn with_edge_cap(mut self, cap_px: f64) -> Self {
        self.edge_cap_px = cap_px;
        self
    }

    fn sum(table: &[f64], cols: usize, region: &CropRegion) -> f64 {
        let (x0, y0) = (region.x as usize, region.y as usize);
        let (x1, y1) = (region.right() as usize, region.bottom() as usize);
        table[y1 * cols + x1] - table[y0 * cols + x1] - table[y1 * cols + x0]
            + table[y0 * cols + x0]
    }

    pub fn score(&self, region: &CropRegion) -> f64 {
        if !region.fits_within(self.width, self.height) {
            return 0.0;
        }
        let cols = self.width as usize + 1;
        let area = region.width as f64 * region.height as f64;
        let mean_sat = Self::sum(&self.saturation, cols, region) / area;
        let mean_lum = Self::sum(&self.luminance, cols, region) / area;

        combine(
            edge_score(self.width, self.height, region, self.edge_cap_px),
            saturation_score(mean_sat),
            brightness_score(mean_lum),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8, 255])
        })
    }

    #[test]
    fn test_edge_score_caps_at_fifty_pixels() {
        let touching = CropRegion::new(0, 10, 50, 50);
        assert_eq!(edge_score(200, 200, &touching, EDGE_CAP_PX), 0.0);

        let halfway = CropRegion::new(25, 25, 100, 100);
        assert!((edge_score(200, 200, &halfway, EDGE_CAP_PX) - 50.0).abs() < 1e-9);

        let inset = CropRegion::new(60, 60, 80, 80);
        assert_eq!(edge_score(200, 200, &inset, EDGE_CAP_PX), 100.0);
    }

    #[test]
    fn test_edge_score_monotone_when_shrinking_away_from_edges() {
        // A is B grown symmetrically toward the border, so B is never worse.
        for inset in 0..60u32 {
            let outer = CropRegion::new(inset, inset, 300 - 2 * inset, 200 - 2 * inset);
            let inner = CropRegion::new(inset + 1, inset + 1, 298 - 2 * inset, 198 - 2 * inset);
            assert!(
                edge_score(300, 200, &outer, EDGE_CAP_PX) <= edge_score(300, 200, &inner, EDGE_CAP_PX)
            );
        }
    }

    #[test]
    fn test_brightness_prefers_mid_grey() {
        assert_eq!(brightness_score(0.5), 100.0);
        assert_eq!(brightness_score(0.0), 0.0);
        assert_eq!(brightness_score(1.0), 0.0);
        assert!((brightness_score(0.25) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_grey_image_has_no_saturation() {
        let img = RgbaImage::from_pixel(100, 100, Rgba([128, 128, 128, 255]));
        let region = CropRegion::new(50, 50, 0, 0);
        assert_eq!(score(img.as_raw(), 100, 100, &region), 0.0);

        let region = CropRegion::new(0, 0, 100, 100);
        // edge 0, saturation 0, brightness ~100
        let s = score(img.as_raw(), 100, 100, &region);
        assert!((s - 0.3 * brightness_score(128.0 / 255.0)).abs() < 1e-6);
    }

    #[test]
    fn test_saturated_region_beats_grey_region() {
        let mut img = RgbaImage::from_pixel(200, 100, Rgba([128, 128, 128, 255]));
        for y in 0..100 {
            for x in 100..200 {
                img.put_pixel(x, y, Rgba([200, 40, 40, 255]));
            }
        }
        let grey = CropRegion::new(0, 0, 100, 100);
        let red = CropRegion::new(100, 0, 100, 100);
        assert!(score(img.as_raw(), 200, 100, &red) > score(img.as_raw(), 200, 100, &grey));
    }

    #[test]
    fn test_summed_area_matches_direct_score() {
        let img = gradient(160, 120);
        let scorer = RegionScorer::new(img.as_raw(), 160, 120);
        for region in [
            CropRegion::new(0, 0, 160, 120),
            CropRegion::new(10, 20, 40, 30),
            CropRegion::new(55, 60, 100, 60),
            CropRegion::new(159, 119, 1, 1),
        ] {
            let direct = score(img.as_raw(), 160, 120, &region);
            let fast = scorer.score(&region);
            assert!((direct - fast).abs() < 1e-6, "{:?}: {} vs {}", region, direct, fast);
        }
    }

    #[test]
    fn test_out_of_bounds_region_scores_zero() {
        let img = gradient(50, 50);
        let scorer = RegionScorer::new(img.as_raw(), 50, 50);
        let region = CropRegion::new(40, 40, 20, 20);
        assert_eq!(scorer.score(&region), 0.0);
        assert_eq!(score(img.as_raw(), 50, 50, &region), 0.0);
    }

    #[test]
    fn test_deterministic() {
        let img = gradient(64, 64);
        let region = CropRegion::new(8, 8, 32, 32);
        assert_eq!(
            score(img.as_raw(), 64, 64, &region),
            score(img.as_raw(), 64, 64, &region)
        );
    }
}
