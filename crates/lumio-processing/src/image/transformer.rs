use image::{DynamicImage, GenericImageView};
use serde::Serialize;
use std::path::{Path, PathBuf};

use lumio_core::models::{CropOperation, ImageOperations, ImageOutputFormat, VariantType};
use lumio_core::{PipelineError, PipelineResult};

use super::encode::{resolve_format, ImageEncoder, DEFAULT_QUALITY};
use super::orientation::ImageOrientation;
use super::resize::ImageResize;
use super::smart_crop::{select_crop, CropSelection};
use crate::output;

/// Result of one image transform.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageTransformOutput {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub mime_type: String,
    pub format: ImageOutputFormat,
    /// Present when the crop region came from the smart-crop engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropSelection>,
}

/// Decoded image after all pixel operations, before encoding.
pub struct Transformed {
    pub image: DynamicImage,
    pub crop: Option<CropSelection>,
}

pub struct ImageTransformer;

impl ImageTransformer {
    /// Apply pixel operations in order: rotate, flip horizontal, flip
    /// vertical, crop, resize.
    pub fn apply_operations(
        mut img: DynamicImage,
        ops: &ImageOperations,
    ) -> PipelineResult<Transformed> {
        if let Some(angle) = ops.normalized_rotation()? {
            tracing::debug!(angle, "Applying rotation");
            img = ImageOrientation::rotate_by_angle(img, angle);
        }
        if ops.flip_horizontal {
            tracing::debug!("Applying horizontal flip");
            img = ImageOrientation::flip_horizontal(img);
        }
        if ops.flip_vertical {
            tracing::debug!("Applying vertical flip");
            img = ImageOrientation::flip_vertical(img);
        }

        let mut selection = None;
        match &ops.crop {
            Some(CropOperation::Region {
                x,
                y,
                width,
                height,
            }) => {
                let (iw, ih) = img.dimensions();
                if *x < 0
                    || *y < 0
                    || *width <= 0
                    || *height <= 0
                    || x + width > iw as i64
                    || y + height > ih as i64
                {
                    return Err(PipelineError::validation(format!(
                        "crop region {}x{}+{}+{} is outside image bounds {}x{}",
                        width, height, x, y, iw, ih
                    )));
                }
                tracing::debug!(x, y, width, height, "Applying crop");
                img = img.crop_imm(*x as u32, *y as u32, *width as u32, *height as u32);
            }
            Some(CropOperation::Content {
                mode,
                target_width,
                target_height,
            }) => {
                let chosen = select_crop(&img.to_rgba8(), *target_width, *target_height, *mode);
                let r = chosen.region;
                tracing::debug!(
                    strategy = ?mode,
                    x = r.x,
                    y = r.y,
                    width = r.width,
                    height = r.height,
                    score = chosen.score,
                    "Applying content-aware crop"
                );
                img = img.crop_imm(r.x, r.y, r.width, r.height);
                selection = Some(chosen);
            }
            None => {}
        }

        if let Some(resize) = ops.resize {
            tracing::debug!(width = ?resize.width, height = ?resize.height, "Applying resize");
            img = ImageResize::apply(img, resize);
        }

        Ok(Transformed {
            image: img,
            crop: selection,
        })
    }

    /// Transform the file at `source_path` into a new file under `output_dir`.
    /// The source is never modified.
    pub fn execute(
        source_path: &Path,
        ops: &ImageOperations,
        output_dir: &Path,
        variant: VariantType,
    ) -> PipelineResult<ImageTransformOutput> {
        ops.validate()?;

        let data = std::fs::read(source_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::source_not_found(format!(
                    "source file missing: {}",
                    source_path.display()
                ))
            } else {
                PipelineError::processing("read source", e)
            }
        })?;
        let source_format = image::guess_format(&data).ok();
        let img = image::load_from_memory(&data).map_err(|e| match ops.crop {
            // Content-aware crops cannot pick a region from an unreadable source.
            Some(CropOperation::Content { .. }) => PipelineError::source_not_found(format!(
                "cannot decode {}: {}",
                source_path.display(),
                e
            )),
            _ => PipelineError::processing("decode source", e),
        })?;

        let Transformed { image, crop } = Self::apply_operations(img, ops)?;
        let (width, height) = image.dimensions();

        let format = resolve_format(ops.format, source_format);
        let quality = ops.quality.unwrap_or(DEFAULT_QUALITY);
        let encoded = ImageEncoder::encode(&image, format, quality)?;

        let source_name = source_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let file_name = output::variant_file_name(source_name, variant.as_str(), format.extension());
        let output_path = output::write_atomic(output_dir, &file_name, &encoded)
            .map_err(|e| PipelineError::processing("write output", e))?;
        let byte_size = std::fs::metadata(&output_path)
            .map_err(|e| PipelineError::processing("stat output", e))?
            .len();

        tracing::info!(
            output = %output_path.display(),
            width,
            height,
            byte_size,
            format = format.extension(),
            "Image variant written"
        );

        Ok(ImageTransformOutput {
            output_path,
            width,
            height,
            byte_size,
            mime_type: format.mime_type().to_string(),
            format,
            crop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use lumio_core::models::{CropStrategy, ResizeOperation};
    use lumio_core::ErrorKind;

    fn write_source(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 251) as u8, (y % 241) as u8, ((x + y) % 239) as u8, 255])
        });
        let path = dir.join(name);
        DynamicImage::ImageRgba8(img)
            .to_rgb8()
            .save_with_format(&path, ImageFormat::Jpeg)
            .unwrap();
        path
    }

    #[test]
    fn test_explicit_crop_to_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "photo.jpg", 1920, 1080);
        let out_dir = dir.path().join("variants");
        let ops = ImageOperations {
            crop: Some(CropOperation::Region {
                x: 100,
                y: 100,
                width: 800,
                height: 600,
            }),
            format: Some(ImageOutputFormat::Jpeg),
            quality: Some(90),
            ..Default::default()
        };

        let out = ImageTransformer::execute(&source, &ops, &out_dir, VariantType::Crop).unwrap();
        assert_eq!((out.width, out.height), (800, 600));
        assert_eq!(out.mime_type, "image/jpeg");
        assert!(out.output_path.exists());
        assert!(out.output_path.starts_with(&out_dir));
        assert_eq!(out.byte_size, std::fs::metadata(&out.output_path).unwrap().len());
        assert_eq!(image::image_dimensions(&out.output_path).unwrap(), (800, 600));
        assert!(source.exists());
    }

    #[test]
    fn test_two_runs_produce_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "a.jpg", 64, 64);
        let ops = ImageOperations::default();
        let a = ImageTransformer::execute(&source, &ops, dir.path(), VariantType::Resize).unwrap();
        let b = ImageTransformer::execute(&source, &ops, dir.path(), VariantType::Resize).unwrap();
        assert_ne!(a.output_path, b.output_path);
    }

    #[test]
    fn test_crop_outside_bounds_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "a.jpg", 100, 100);
        let ops = ImageOperations {
            crop: Some(CropOperation::Region {
                x: 50,
                y: 50,
                width: 60,
                height: 10,
            }),
            ..Default::default()
        };
        let err =
            ImageTransformer::execute(&source, &ops, dir.path(), VariantType::Crop).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_missing_source_is_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageTransformer::execute(
            &dir.path().join("gone.jpg"),
            &ImageOperations::default(),
            dir.path(),
            VariantType::Crop,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);
    }

    #[test]
    fn test_corrupt_source_is_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        let err = ImageTransformer::execute(
            &path,
            &ImageOperations::default(),
            dir.path(),
            VariantType::Crop,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Processing);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_corrupt_source_for_smart_crop_is_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        let ops = ImageOperations {
            crop: Some(CropOperation::Content {
                mode: CropStrategy::Smart,
                target_width: 800,
                target_height: 600,
            }),
            ..Default::default()
        };

        let err = ImageTransformer::execute(&path, &ops, dir.path(), VariantType::SmartCrop)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_operation_order_rotate_then_crop_then_resize() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(400, 200, Rgba([9, 9, 9, 255])));
        let ops = ImageOperations {
            rotate: Some(90),
            // Only valid against the rotated 200x400 frame.
            crop: Some(CropOperation::Region {
                x: 0,
                y: 0,
                width: 200,
                height: 300,
            }),
            resize: Some(ResizeOperation {
                width: Some(100),
                height: None,
            }),
            ..Default::default()
        };
        let out = ImageTransformer::apply_operations(img, &ops).unwrap();
        assert_eq!(out.image.dimensions(), (100, 150));
    }

    #[test]
    fn test_smart_crop_operation_records_selection() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(300, 200, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        }));
        let ops = ImageOperations {
            crop: Some(CropOperation::Content {
                mode: CropStrategy::Smart,
                target_width: 100,
                target_height: 100,
            }),
            ..Default::default()
        };
        let out = ImageTransformer::apply_operations(img, &ops).unwrap();
        let selection = out.crop.unwrap();
        assert_eq!(
            out.image.dimensions(),
            (selection.region.width, selection.region.height)
        );
        assert_eq!(selection.region.width, selection.region.height);
    }

    #[test]
    fn test_png_source_keeps_png_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icon.png");
        RgbaImage::from_pixel(32, 32, Rgba([10, 20, 30, 128]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        let out = ImageTransformer::execute(
            &path,
            &ImageOperations::default(),
            dir.path(),
            VariantType::Resize,
        )
        .unwrap();
        assert_eq!(out.format, ImageOutputFormat::Png);
        assert_eq!(out.mime_type, "image/png");
        assert!(out.output_path.extension().unwrap() == "png");
    }
}
