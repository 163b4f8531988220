//! Image processing module
//!
//! This module provides image processing capabilities including:
//! - Content-aware crop selection (scorer, candidates, smart_crop)
//! - Image transformations (transformer, resize, orientation)
//! - Output encoding (encode)

pub mod candidates;
pub mod encode;
pub mod orientation;
pub mod resize;
pub mod scorer;
pub mod smart_crop;
pub mod transformer;

pub use encode::ImageEncoder;
pub use orientation::ImageOrientation;
pub use resize::ImageResize;
pub use scorer::RegionScorer;
pub use smart_crop::{select_crop, CropSelection};
pub use transformer::{ImageTransformOutput, ImageTransformer};
