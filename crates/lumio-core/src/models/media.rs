use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Read-only reference to an uploaded image or video.
///
/// `path` is relative to the uploads root; the pipeline resolves it and never
/// writes to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMedia {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: MediaKind,
    pub path: String,
    pub filename: String,
    pub mime_type: Option<String>,
}

impl SourceMedia {
    pub fn is_owned_by(&self, owner_id: Uuid) -> bool {
        self.owner_id == owner_id
    }
}

/// Tag recorded on each derived variant describing what produced it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VariantType {
    Crop,
    Resize,
    #[serde(rename = "autocrop")]
    AutoCrop,
    #[serde(rename = "smartcrop")]
    SmartCrop,
    Video,
    Zip,
}

impl VariantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantType::Crop => "crop",
            VariantType::Resize => "resize",
            VariantType::AutoCrop => "autocrop",
            VariantType::SmartCrop => "smartcrop",
            VariantType::Video => "video",
            VariantType::Zip => "zip",
        }
    }
}

impl Display for VariantType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crop" => Ok(VariantType::Crop),
            "resize" => Ok(VariantType::Resize),
            "autocrop" => Ok(VariantType::AutoCrop),
            "smartcrop" => Ok(VariantType::SmartCrop),
            "video" => Ok(VariantType::Video),
            "zip" => Ok(VariantType::Zip),
            _ => Err(anyhow::anyhow!("Invalid variant type: {}", s)),
        }
    }
}

/// Output artifact of a successful job. Recorded once, after the file is
/// fully written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedVariant {
    pub id: Uuid,
    /// Absent for archives, which are built from several sources.
    pub source_id: Option<Uuid>,
    pub owner_id: Uuid,
    pub filename: String,
    /// Relative to the uploads root.
    pub storage_path: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub resolution: Option<String>,
    pub byte_size: u64,
    pub mime_type: String,
    pub variant_type: VariantType,
    pub parameters: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl DerivedVariant {
    pub fn new(
        source_id: Option<Uuid>,
        owner_id: Uuid,
        variant_type: VariantType,
        filename: String,
        storage_path: String,
        byte_size: u64,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            owner_id,
            filename,
            storage_path,
            width: None,
            height: None,
            duration_seconds: None,
            resolution: None,
            byte_size,
            mime_type: mime_type.into(),
            variant_type,
            parameters: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_type_tags() {
        assert_eq!(
            serde_json::to_value(VariantType::SmartCrop).unwrap(),
            "smartcrop"
        );
        assert_eq!(
            serde_json::to_value(VariantType::AutoCrop).unwrap(),
            "autocrop"
        );
        assert_eq!(serde_json::to_value(VariantType::Zip).unwrap(), "zip");
        for tag in ["crop", "resize", "autocrop", "smartcrop", "video", "zip"] {
            assert_eq!(tag.parse::<VariantType>().unwrap().as_str(), tag);
        }
    }

    #[test]
    fn test_ownership_check() {
        let owner = Uuid::new_v4();
        let media = SourceMedia {
            id: Uuid::new_v4(),
            owner_id: owner,
            kind: MediaKind::Image,
            path: "images/a.jpg".to_string(),
            filename: "a.jpg".to_string(),
            mime_type: Some("image/jpeg".to_string()),
        };
        assert!(media.is_owned_by(owner));
        assert!(!media.is_owned_by(Uuid::new_v4()));
    }

    #[test]
    fn test_variant_builder() {
        let variant = DerivedVariant::new(
            Some(Uuid::new_v4()),
            Uuid::new_v4(),
            VariantType::Crop,
            "a_crop.jpg".to_string(),
            "variants/a_crop.jpg".to_string(),
            1024,
            "image/jpeg",
        )
        .with_dimensions(800, 600);
        assert_eq!(variant.width, Some(800));
        assert_eq!(variant.height, Some(600));
        assert!(variant.duration_seconds.is_none());
    }
}
