//! Smart-crop engine
//!
//! Picks the most interesting window of a target aspect ratio. Scoring runs
//! on a copy downscaled to at most [`ANALYSIS_MAX_DIMENSION`] pixels, and the
//! winner is mapped back to source coordinates. Degenerate input falls back to
//! the largest centered window, so selection itself never fails.

use image::{imageops, ImageBuffer, RgbaImage};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use lumio_core::models::{CropRegion, CropStrategy};

use super::candidates;
use super::scorer::{RegionScorer, EDGE_CAP_PX};

/// Longest side of the copy the scorer runs on.
pub const ANALYSIS_MAX_DIMENSION: u32 = 512;

/// Chosen crop and the score it won with (0 for autocrop and fallbacks).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CropSelection {
    pub region: CropRegion,
    pub score: f64,
}

impl CropSelection {
    fn unscored(region: CropRegion) -> Self {
        Self { region, score: 0.0 }
    }
}

/// Largest window of `aspect_ratio` centered in the image. Falls back to the
/// whole image for a non-positive or non-finite ratio.
pub fn largest_centered_fit(image_width: u32, image_height: u32, aspect_ratio: f64) -> CropRegion {
    if image_width == 0 || image_height == 0 || !(aspect_ratio.is_finite() && aspect_ratio > 0.0)
    {
        return CropRegion::new(0, 0, image_width, image_height);
    }

    let (width, height) = if image_width as f64 / image_height as f64 > aspect_ratio {
        let w = (image_height as f64 * aspect_ratio).round() as u32;
        (w.clamp(1, image_width), image_height)
    } else {
        let h = (image_width as f64 / aspect_ratio).round() as u32;
        (image_width, h.clamp(1, image_height))
    };

    CropRegion::new(
        (image_width - width) / 2,
        (image_height - height) / 2,
        width,
        height,
    )
}

/// Centered largest fit, with the target ratio turned to match the source's
/// orientation.
pub fn autocrop(
    image_width: u32,
    image_height: u32,
    target_width: u32,
    target_height: u32,
) -> CropSelection {
    if target_width == 0 || target_height == 0 {
        return CropSelection::unscored(CropRegion::new(0, 0, image_width, image_height));
    }
    let long = target_width.max(target_height) as f64;
    let short = target_width.min(target_height) as f64;
    let ratio = if image_width >= image_height {
        long / short
    } else {
        short / long
    };
    CropSelection::unscored(largest_centered_fit(image_width, image_height, ratio))
}

/// Map a region found on the analysis copy back to source pixels, keeping
/// its center and recomputing the height from the exact ratio.
fn to_source(
    region: &CropRegion,
    scale_x: f64,
    scale_y: f64,
    aspect_ratio: f64,
    image_width: u32,
    image_height: u32,
) -> CropRegion {
    let center_x = (region.x as f64 + region.width as f64 / 2.0) / scale_x;
    let center_y = (region.y as f64 + region.height as f64 / 2.0) / scale_y;

    let mut width = ((region.width as f64 / scale_x).round() as u32).clamp(1, image_width);
    let mut height = (width as f64 / aspect_ratio).round() as u32;
    if height > image_height {
        height = image_height;
        width = ((height as f64 * aspect_ratio).round() as u32).clamp(1, image_width);
    }
    let height = height.max(1);

    let x = (center_x - width as f64 / 2.0)
        .round()
        .clamp(0.0, (image_width - width) as f64) as u32;
    let y = (center_y - height as f64 / 2.0)
        .round()
        .clamp(0.0, (image_height - height) as f64) as u32;

    CropRegion::new(x, y, width, height)
}

/// Pick the highest-scoring crop of ratio `target_width / target_height` from
/// an RGBA8 buffer.
///
/// Never fails: with no usable candidate (or a non-positive target) the
/// result is the centered largest fit, or the whole image.
pub fn select_best_crop(
    pixels: &[u8],
    image_width: u32,
    image_height: u32,
    target_width: u32,
    target_height: u32,
) -> CropSelection {
    let full = CropRegion::new(0, 0, image_width, image_height);
    if image_width == 0 || image_height == 0 || target_width == 0 || target_height == 0 {
        return CropSelection::unscored(full);
    }

    let aspect_ratio = target_width as f64 / target_height as f64;
    let max_scale =
        (image_width as f64 / target_width as f64).min(image_height as f64 / target_height as f64);
    let fallback = || {
        CropSelection::unscored(largest_centered_fit(image_width, image_height, aspect_ratio))
    };

    // Downscale for speed; the table build is linear in pixel count.
    let factor = (ANALYSIS_MAX_DIMENSION as f64 / image_width.max(image_height) as f64).min(1.0);
    let (aw, ah, analysis): (u32, u32, Cow<'_, [u8]>) = if factor < 1.0 {
        let aw = ((image_width as f64 * factor).round() as u32).max(1);
        let ah = ((image_height as f64 * factor).round() as u32).max(1);
        let source: Option<RgbaImage> =
            ImageBuffer::from_raw(image_width, image_height, pixels.to_vec());
        match source {
            Some(source) => {
                let small = imageops::resize(&source, aw, ah, imageops::FilterType::Triangle);
                (aw, ah, Cow::Owned(small.into_raw()))
            }
            None => return fallback(),
        }
    } else {
        (image_width, image_height, Cow::Borrowed(pixels))
    };
    let scale_x = aw as f64 / image_width as f64;
    let scale_y = ah as f64 / image_height as f64;

    let max_width = ((target_width as f64 * max_scale * scale_x).round() as u32).min(aw);
    let max_height = ((target_height as f64 * max_scale * scale_y).round() as u32).min(ah);

    let scorer =
        RegionScorer::new(&analysis, aw, ah).with_edge_cap(EDGE_CAP_PX * scale_x.min(scale_y));

    let mut best: Option<CropSelection> = None;
    for region in candidates::generate(aw, ah, aspect_ratio, max_scale, max_width, max_height) {
        let score = scorer.score(&region);
        // Strict comparison keeps the first of equal scores.
        if best.map_or(true, |b| score > b.score) {
            best = Some(CropSelection { region, score });
        }
    }

    match best {
        Some(selection) => CropSelection {
            region: to_source(
                &selection.region,
                scale_x,
                scale_y,
                aspect_ratio,
                image_width,
                image_height,
            ),
            score: selection.score,
        },
        None => fallback(),
    }
}

pub fn select_crop(
    image: &RgbaImage,
    target_width: u32,
    target_height: u32,
    strategy: CropStrategy,
) -> CropSelection {
    let (width, height) = image.dimensions();
    match strategy {
        CropStrategy::Auto => autocrop(width, height, target_width, target_height),
        CropStrategy::Smart => {
            select_best_crop(image.as_raw(), width, height, target_width, target_height)
        }
    }
}
