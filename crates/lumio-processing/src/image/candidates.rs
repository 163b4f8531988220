//! Candidate crop windows for smart crop
//!
//! Window sizes are relative to a unit window of `max_width / max_scale`
//! pixels wide. The engine passes the largest target-ratio fit as
//! `max_width`/`max_height`, which makes the unit window the requested
//! target size and `max_scale` the largest scale that still fits.

use lumio_core::models::CropRegion;

pub const SCALES: [f64; 3] = [0.25, 0.5, 1.0];
pub const MIN_STEP: u32 = 8;

/// Sliding step for an image, in pixels.
pub fn step_for(image_width: u32, image_height: u32) -> u32 {
    (image_width.min(image_height) / 100).max(MIN_STEP)
}

/// Window for `scale`, or `None` if it would be empty.
fn window_at(
    scale: f64,
    image_width: u32,
    image_height: u32,
    aspect_ratio: f64,
    max_scale: f64,
    max_width: u32,
    max_height: u32,
) -> Option<(u32, u32)> {
    if !(aspect_ratio.is_finite() && aspect_ratio > 0.0)
        || !(max_scale.is_finite() && max_scale > 0.0)
        || !(scale.is_finite() && scale > 0.0)
    {
        return None;
    }

    let bound_w = max_width.min(image_width) as f64;
    let bound_h = max_height.min(image_height) as f64;
    if bound_w < 1.0 || bound_h < 1.0 {
        return None;
    }

    let w = max_width as f64 * scale / max_scale;
    let shrink = (bound_w / w).min(bound_h * aspect_ratio / w).min(1.0);

    // Nudge before flooring so 1439.9999999 stays 1440.
    let mut width = (w * shrink + 1e-6).floor() as u32;
    let mut height = (width as f64 / aspect_ratio).round() as u32;
    if height as f64 > bound_h {
        height = bound_h as u32;
        width = ((height as f64 * aspect_ratio).round() as u32).min(bound_w as u32);
    }

    if width == 0 || height == 0 {
        None
    } else {
        Some((width, height))
    }
}

/// Restartable, lazily evaluated candidate sequence.
///
/// Order: scale-major (0.25, 0.5, 1.0, then `max_scale`), then rows top to
/// bottom, then columns left to right. Scales whose window collapses to
/// nothing are skipped; a window size already produced by an earlier scale
/// is not repeated.
#[derive(Debug, Clone)]
pub struct Candidates {
    image_width: u32,
    image_height: u32,
    step: u32,
    windows: Vec<(u32, u32)>,
    window: usize,
    x: u32,
    y: u32,
}

impl Candidates {
    pub fn windows(&self) -> &[(u32, u32)] {
        &self.windows
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// A fresh sequence from the first candidate.
    pub fn restart(&self) -> Self {
        Self {
            window: 0,
            x: 0,
            y: 0,
            ..self.clone()
        }
    }
}

impl Iterator for Candidates {
    type Item = CropRegion;

    fn next(&mut self) -> Option<CropRegion> {
        while let Some(&(w, h)) = self.windows.get(self.window) {
            if self.y + h <= self.image_height && self.x + w <= self.image_width {
                let region = CropRegion::new(self.x, self.y, w, h);
                self.x += self.step;
                if self.x + w > self.image_width {
                    self.x = 0;
                    self.y += self.step;
                }
                return Some(region);
            }
            self.window += 1;
            self.x = 0;
            self.y = 0;
        }
        None
    }
}

/// All candidate windows of ratio `aspect_ratio` (width / height).
pub fn generate(
    image_width: u32,
    image_height: u32,
    aspect_ratio: f64,
    max_scale: f64,
    max_width: u32,
    max_height: u32,
) -> Candidates {
    let mut windows: Vec<(u32, u32)> = Vec::with_capacity(SCALES.len() + 1);
    for scale in SCALES.iter().copied().chain(std::iter::once(max_scale)) {
        if let Some(window) = window_at(
            scale,
            image_width,
            image_height,
            aspect_ratio,
            max_scale,
            max_width,
            max_height,
        ) {
            if !windows.contains(&window) {
                windows.push(window);
            }
        }
    }

    Candidates {
        image_width,
        image_height,
        step: step_for(image_width, image_height),
        windows,
        window: 0,
        x: 0,
        y: 0,
    }
}
