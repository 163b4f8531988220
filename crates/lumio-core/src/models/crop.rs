use serde::{Deserialize, Serialize};

/// Pixel-space crop rectangle. Never persisted on its own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Non-empty and entirely inside an image of the given size.
    pub fn fits_within(&self, image_width: u32, image_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= image_width as u64
            && self.y as u64 + self.height as u64 <= image_height as u64
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_within() {
        assert!(CropRegion::new(0, 0, 100, 100).fits_within(100, 100));
        assert!(CropRegion::new(10, 20, 90, 80).fits_within(100, 100));
        assert!(!CropRegion::new(11, 0, 90, 100).fits_within(100, 100));
        assert!(!CropRegion::new(0, 0, 0, 10).fits_within(100, 100));
        assert!(!CropRegion::new(u32::MAX, 0, 10, 10).fits_within(100, 100));
    }

    #[test]
    fn test_aspect_ratio() {
        let region = CropRegion::new(0, 0, 800, 600);
        assert!((region.aspect_ratio() - 4.0 / 3.0).abs() < 1e-9);
        assert_eq!(region.right(), 800);
        assert_eq!(region.bottom(), 600);
    }
}
