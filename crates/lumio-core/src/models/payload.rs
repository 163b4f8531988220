//! Job submission payloads
//!
//! Wire shape is camelCase JSON, matching what the web tier sends. Structural
//! checks that need no source file live here; checks against the decoded
//! source (crop bounds) live with the executors.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

use super::job::{JobPayload, JobType};
use crate::error::{PipelineError, PipelineResult};

pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

/// How a content-aware crop picks its region.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CropStrategy {
    /// Largest centered window of the target ratio, oriented like the source.
    Auto,
    /// Scored candidate search.
    #[default]
    Smart,
}

impl CropStrategy {
    pub fn variant_type(&self) -> super::VariantType {
        match self {
            CropStrategy::Auto => super::VariantType::AutoCrop,
            CropStrategy::Smart => super::VariantType::SmartCrop,
        }
    }
}

/// Crop step of an image job: an explicit rectangle, or a target size whose
/// region is chosen by the smart-crop engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CropOperation {
    #[serde(rename_all = "camelCase")]
    Content {
        mode: CropStrategy,
        target_width: u32,
        target_height: u32,
    },
    Region {
        x: i64,
        y: i64,
        width: i64,
        height: i64,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResizeOperation {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageOutputFormat {
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
    Webp,
}

impl ImageOutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageOutputFormat::Jpeg => "image/jpeg",
            ImageOutputFormat::Png => "image/png",
            ImageOutputFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageOutputFormat::Jpeg => "jpg",
            ImageOutputFormat::Png => "png",
            ImageOutputFormat::Webp => "webp",
        }
    }
}

/// Independent image steps, applied in a fixed order:
/// rotate, flip horizontal, flip vertical, crop, resize, encode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageOperations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize: Option<ResizeOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate: Option<i32>,
    #[serde(default)]
    pub flip_horizontal: bool,
    #[serde(default)]
    pub flip_vertical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ImageOutputFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
}

impl ImageOperations {
    /// Rotation folded into `0..360`. Only quarter turns are supported.
    pub fn normalized_rotation(&self) -> PipelineResult<Option<u16>> {
        match self.rotate {
            None => Ok(None),
            Some(deg) if deg % 90 != 0 => Err(PipelineError::validation(format!(
                "rotate must be a multiple of 90 degrees, got {}",
                deg
            ))),
            Some(deg) => match deg.rem_euclid(360) {
                0 => Ok(None),
                d => Ok(Some(d as u16)),
            },
        }
    }

    pub fn validate(&self) -> PipelineResult<()> {
        self.normalized_rotation()?;

        if let Some(q) = self.quality {
            if !(MIN_QUALITY..=MAX_QUALITY).contains(&q) {
                return Err(PipelineError::validation(format!(
                    "quality must be between {} and {}, got {}",
                    MIN_QUALITY, MAX_QUALITY, q
                )));
            }
        }

        match &self.crop {
            Some(CropOperation::Region {
                x,
                y,
                width,
                height,
            }) => {
                if *x < 0 || *y < 0 {
                    return Err(PipelineError::validation(format!(
                        "crop origin must be non-negative, got ({}, {})",
                        x, y
                    )));
                }
                if *width <= 0 || *height <= 0 {
                    return Err(PipelineError::validation(format!(
                        "crop dimensions must be positive, got {}x{}",
                        width, height
                    )));
                }
            }
            Some(CropOperation::Content {
                target_width,
                target_height,
                ..
            }) => {
                if *target_width == 0 || *target_height == 0 {
                    return Err(PipelineError::validation(
                        "crop target dimensions must be positive",
                    ));
                }
            }
            None => {}
        }

        if let Some(resize) = &self.resize {
            match (resize.width, resize.height) {
                (None, None) => {
                    return Err(PipelineError::validation(
                        "resize requires a width or a height",
                    ))
                }
                (Some(0), _) | (_, Some(0)) => {
                    return Err(PipelineError::validation(
                        "resize dimensions must be positive",
                    ))
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// IMAGE_CROP / IMAGE_RESIZE payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageTransformPayload {
    pub image_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub operations: ImageOperations,
}

impl JobPayload for ImageTransformPayload {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }
}

/// IMAGE_SMART_CROP payload; becomes a content crop operation at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartCropPayload {
    pub image_id: Uuid,
    pub user_id: Uuid,
    pub target_width: u32,
    pub target_height: u32,
    #[serde(default)]
    pub strategy: CropStrategy,
}

impl SmartCropPayload {
    pub fn to_operations(&self) -> ImageOperations {
        ImageOperations {
            crop: Some(CropOperation::Content {
                mode: self.strategy,
                target_width: self.target_width,
                target_height: self.target_height,
            }),
            ..Default::default()
        }
    }
}

impl JobPayload for SmartCropPayload {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }
}

/// Target container for video re-encoding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoContainer {
    Mp4,
    Webm,
    Mov,
    Mkv,
}

impl VideoContainer {
    /// (video codec, audio codec) used for this container.
    pub fn codecs(&self) -> (&'static str, &'static str) {
        match self {
            VideoContainer::Mp4 | VideoContainer::Mov | VideoContainer::Mkv => ("libx264", "aac"),
            VideoContainer::Webm => ("libvpx-vp9", "libopus"),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            VideoContainer::Mp4 => "mp4",
            VideoContainer::Webm => "webm",
            VideoContainer::Mov => "mov",
            VideoContainer::Mkv => "mkv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoContainer::Mp4 => "video/mp4",
            VideoContainer::Webm => "video/webm",
            VideoContainer::Mov => "video/quicktime",
            VideoContainer::Mkv => "video/x-matroska",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" | "m4v" => Some(VideoContainer::Mp4),
            "webm" => Some(VideoContainer::Webm),
            "mov" => Some(VideoContainer::Mov),
            "mkv" => Some(VideoContainer::Mkv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Low,
    Medium,
    High,
}

impl VideoQuality {
    /// (video kbps, audio kbps)
    pub fn bitrates_kbps(&self) -> (u32, u32) {
        match self {
            VideoQuality::Low => (800, 96),
            VideoQuality::Medium => (2500, 128),
            VideoQuality::High => (5000, 192),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResolutionPreset {
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "4k")]
    P4k,
}

impl ResolutionPreset {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ResolutionPreset::P480 => (854, 480),
            ResolutionPreset::P720 => (1280, 720),
            ResolutionPreset::P1080 => (1920, 1080),
            ResolutionPreset::P4k => (3840, 2160),
        }
    }
}

impl Display for ResolutionPreset {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ResolutionPreset::P480 => write!(f, "480p"),
            ResolutionPreset::P720 => write!(f, "720p"),
            ResolutionPreset::P1080 => write!(f, "1080p"),
            ResolutionPreset::P4k => write!(f, "4k"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrimOperation {
    /// Start offset in seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoCropOperation {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VideoOperations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<VideoContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<VideoQuality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionPreset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<TrimOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<VideoCropOperation>,
}

impl VideoOperations {
    pub fn validate(&self) -> PipelineResult<()> {
        if let Some(trim) = &self.trim {
            if !trim.start.is_finite() || trim.start < 0.0 {
                return Err(PipelineError::validation(format!(
                    "trim start must be a non-negative number of seconds, got {}",
                    trim.start
                )));
            }
            if !trim.duration.is_finite() || trim.duration <= 0.0 {
                return Err(PipelineError::validation(format!(
                    "trim duration must be positive, got {}",
                    trim.duration
                )));
            }
        }
        if let Some(crop) = &self.crop {
            if crop.width == 0 || crop.height == 0 {
                return Err(PipelineError::validation(
                    "video crop dimensions must be positive",
                ));
            }
        }
        Ok(())
    }
}

/// VIDEO_PROCESS payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProcessPayload {
    pub video_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub operations: VideoOperations,
}

impl JobPayload for VideoProcessPayload {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }
}

/// ZIP_CREATE payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipCreatePayload {
    pub image_ids: Vec<Uuid>,
    pub user_id: Uuid,
    pub archive_name: String,
    #[serde(default)]
    pub include_metadata: bool,
}

impl JobPayload for ZipCreatePayload {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }
}

/// Typed submission: one variant per job type, so callers cannot pair a
/// payload with the wrong type tag.
#[derive(Debug, Clone)]
pub enum JobRequest {
    ImageCrop(ImageTransformPayload),
    ImageResize(ImageTransformPayload),
    ImageSmartCrop(SmartCropPayload),
    VideoProcess(VideoProcessPayload),
    ZipCreate(ZipCreatePayload),
}

impl JobRequest {
    pub fn job_type(&self) -> JobType {
        match self {
            JobRequest::ImageCrop(_) => JobType::ImageCrop,
            JobRequest::ImageResize(_) => JobType::ImageResize,
            JobRequest::ImageSmartCrop(_) => JobType::ImageSmartCrop,
            JobRequest::VideoProcess(_) => JobType::VideoProcess,
            JobRequest::ZipCreate(_) => JobType::ZipCreate,
        }
    }

    pub fn owner_id(&self) -> Uuid {
        match self {
            JobRequest::ImageCrop(p) | JobRequest::ImageResize(p) => p.owner_id(),
            JobRequest::ImageSmartCrop(p) => p.owner_id(),
            JobRequest::VideoProcess(p) => p.owner_id(),
            JobRequest::ZipCreate(p) => p.owner_id(),
        }
    }

    pub fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            JobRequest::ImageCrop(p) | JobRequest::ImageResize(p) => serde_json::to_value(p),
            JobRequest::ImageSmartCrop(p) => serde_json::to_value(p),
            JobRequest::VideoProcess(p) => serde_json::to_value(p),
            JobRequest::ZipCreate(p) => serde_json::to_value(p),
        }
    }
}
