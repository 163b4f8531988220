use image::{imageops::FilterType, DynamicImage, GenericImageView};

use lumio_core::models::ResizeOperation;

/// Image resize operations
pub struct ImageResize;

impl ImageResize {
    /// Fit-inside target size. Never upscales; when only one side is given the
    /// other follows the source aspect ratio.
    pub fn calculate_dimensions(
        orig_width: u32,
        orig_height: u32,
        resize: ResizeOperation,
    ) -> (u32, u32) {
        let (ow, oh) = (orig_width as f64, orig_height as f64);
        let scale = match (resize.width, resize.height) {
            (Some(w), Some(h)) => (w as f64 / ow).min(h as f64 / oh),
            (Some(w), None) => w as f64 / ow,
            (None, Some(h)) => h as f64 / oh,
            (None, None) => 1.0,
        }
        .min(1.0);

        let width = ((ow * scale).round() as u32).clamp(1, orig_width.max(1));
        let height = ((oh * scale).round() as u32).clamp(1, orig_height.max(1));
        (width, height)
    }

    /// Pick the filter by how much the image shrinks.
    pub fn select_filter(orig_width: u32, target_width: u32) -> FilterType {
        if target_width == 0 || orig_width / target_width.max(1) >= 4 {
            FilterType::Triangle
        } else {
            FilterType::Lanczos3
        }
    }

    pub fn apply(img: DynamicImage, resize: ResizeOperation) -> DynamicImage {
        let (w, h) = img.dimensions();
        let (tw, th) = Self::calculate_dimensions(w, h, resize);
        if (tw, th) == (w, h) {
            return img;
        }
        img.resize_exact(tw, th, Self::select_filter(w, tw))
    }
}
