use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

use lumio_core::models::ImageOutputFormat;
use lumio_core::{PipelineError, PipelineResult};

pub const DEFAULT_QUALITY: u8 = 85;

/// Requested format, else the source's own if it is one we write, else JPEG.
pub fn resolve_format(
    requested: Option<ImageOutputFormat>,
    source: Option<ImageFormat>,
) -> ImageOutputFormat {
    if let Some(format) = requested {
        return format;
    }
    match source {
        Some(ImageFormat::Png) => ImageOutputFormat::Png,
        Some(ImageFormat::WebP) => ImageOutputFormat::Webp,
        _ => ImageOutputFormat::Jpeg,
    }
}

/// Image encoding for derived variants
pub struct ImageEncoder;

impl ImageEncoder {
    /// Encode with `quality` (1-100). PNG ignores quality.
    pub fn encode(img: &DynamicImage, format: ImageOutputFormat, quality: u8) -> PipelineResult<Bytes> {
        let quality = quality.clamp(1, 100);
        match format {
            ImageOutputFormat::Jpeg => Self::encode_jpeg(img, quality),
            ImageOutputFormat::Png => Self::encode_png(img),
            ImageOutputFormat::Webp => Self::encode_webp(img, quality),
        }
    }

    fn encode_jpeg(img: &DynamicImage, quality: u8) -> PipelineResult<Bytes> {
        // JPEG has no alpha channel.
        let rgb = img.to_rgb8();
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality)
            .encode_image(&rgb)
            .map_err(|e| PipelineError::processing("encode jpeg", e))?;
        Ok(Bytes::from(buffer))
    }

    fn encode_png(img: &DynamicImage) -> PipelineResult<Bytes> {
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| PipelineError::processing("encode png", e))?;
        Ok(Bytes::from(buffer))
    }

    fn encode_webp(img: &DynamicImage, quality: u8) -> PipelineResult<Bytes> {
        let (width, height) = img.dimensions();
        let rgba = img.to_rgba8();
        let encoder = webp::Encoder::from_rgba(&rgba, width, height);
        let webp_data = encoder.encode(quality as f32);
        if webp_data.is_empty() {
            return Err(PipelineError::processing(
                "encode webp",
                "encoder produced no data",
            ));
        }
        Ok(Bytes::copy_from_slice(&webp_data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(64, 48, |x, y| {
            Rgba([(x * 4) as u8, (y * 5) as u8, 90, 255])
        }))
    }

    #[test]
    fn test_resolve_format() {
        assert_eq!(
            resolve_format(Some(ImageOutputFormat::Webp), Some(ImageFormat::Png)),
            ImageOutputFormat::Webp
        );
        assert_eq!(
            resolve_format(None, Some(ImageFormat::Png)),
            ImageOutputFormat::Png
        );
        assert_eq!(
            resolve_format(None, Some(ImageFormat::Gif)),
            ImageOutputFormat::Jpeg
        );
        assert_eq!(resolve_format(None, None), ImageOutputFormat::Jpeg);
    }

    #[test]
    fn test_encoded_bytes_match_format() {
        for (format, expected) in [
            (ImageOutputFormat::Jpeg, ImageFormat::Jpeg),
            (ImageOutputFormat::Png, ImageFormat::Png),
            (ImageOutputFormat::Webp, ImageFormat::WebP),
        ] {
            let data = ImageEncoder::encode(&sample(), format, 80).unwrap();
            assert_eq!(image::guess_format(&data).unwrap(), expected);
            let decoded = image::load_from_memory(&data).unwrap();
            assert_eq!(decoded.dimensions(), (64, 48));
        }
    }

    #[test]
    fn test_lower_jpeg_quality_is_smaller() {
        let noisy = DynamicImage::ImageRgba8(RgbaImage::from_fn(128, 128, |x, y| {
            Rgba([(x * 31 + y * 17) as u8, (x * y) as u8, (x ^ y) as u8, 255])
        }));
        let low = ImageEncoder::encode(&noisy, ImageOutputFormat::Jpeg, 10).unwrap();
        let high = ImageEncoder::encode(&noisy, ImageOutputFormat::Jpeg, 95).unwrap();
        assert!(low.len() < high.len());
    }
}
