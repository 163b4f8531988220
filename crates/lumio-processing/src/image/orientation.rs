use image::{imageops, DynamicImage};

/// Image orientation operations (rotation and flipping)
pub struct ImageOrientation;

impl ImageOrientation {
    /// Rotate clockwise by 90, 180 or 270 degrees; any other angle is a no-op.
    pub fn rotate_by_angle(img: DynamicImage, angle: u16) -> DynamicImage {
        match angle {
            90 => img.rotate90(),
            180 => img.rotate180(),
            270 => img.rotate270(),
            _ => img,
        }
    }

    pub fn flip_horizontal(img: DynamicImage) -> DynamicImage {
        DynamicImage::ImageRgba8(imageops::flip_horizontal(&img.to_rgba8()))
    }

    pub fn flip_vertical(img: DynamicImage) -> DynamicImage {
        DynamicImage::ImageRgba8(imageops::flip_vertical(&img.to_rgba8()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn marked() -> DynamicImage {
        // 4x2, red marker at top-left.
        let mut img = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_rotate_swaps_dimensions() {
        assert_eq!(ImageOrientation::rotate_by_angle(marked(), 90).dimensions(), (2, 4));
        assert_eq!(ImageOrientation::rotate_by_angle(marked(), 180).dimensions(), (4, 2));
        assert_eq!(ImageOrientation::rotate_by_angle(marked(), 270).dimensions(), (2, 4));
        assert_eq!(ImageOrientation::rotate_by_angle(marked(), 45).dimensions(), (4, 2));
    }

    #[test]
    fn test_rotate_90_moves_marker_to_top_right() {
        let rotated = ImageOrientation::rotate_by_angle(marked(), 90).to_rgba8();
        assert_eq!(rotated.get_pixel(1, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_flips_move_marker() {
        let h = ImageOrientation::flip_horizontal(marked()).to_rgba8();
        assert_eq!(h.get_pixel(3, 0), &Rgba([255, 0, 0, 255]));

        let v = ImageOrientation::flip_vertical(marked()).to_rgba8();
        assert_eq!(v.get_pixel(0, 1), &Rgba([255, 0, 0, 255]));
    }
}
