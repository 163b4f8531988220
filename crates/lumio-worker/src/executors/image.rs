use async_trait::async_trait;
use serde_json::json;

use lumio_core::models::{
    CropOperation, DerivedVariant, ImageOperations, ImageTransformPayload, Job, JobType,
    MediaKind, SmartCropPayload, VariantType,
};
use lumio_core::{PipelineError, PipelineResult};
use lumio_processing::image::ImageTransformer;
use uuid::Uuid;

use crate::context::PipelineContext;
use crate::executor::{JobExecutor, ProgressSender};

/// IMAGE_CROP, IMAGE_RESIZE and IMAGE_SMART_CROP.
pub struct ImageExecutor;

struct ImageJob {
    image_id: Uuid,
    owner_id: Uuid,
    operations: ImageOperations,
    variant: VariantType,
}

impl ImageJob {
    fn from_job(job: &Job) -> PipelineResult<Self> {
        match job.job_type {
            JobType::ImageCrop | JobType::ImageResize => {
                let payload: ImageTransformPayload = job.try_payload_as()?;
                let variant = match (&payload.operations.crop, job.job_type) {
                    (Some(CropOperation::Content { mode, .. }), _) => mode.variant_type(),
                    (_, JobType::ImageCrop) => VariantType::Crop,
                    _ => VariantType::Resize,
                };
                Ok(Self {
                    image_id: payload.image_id,
                    owner_id: payload.user_id,
                    operations: payload.operations,
                    variant,
                })
            }
            JobType::ImageSmartCrop => {
                let payload: SmartCropPayload = job.try_payload_as()?;
                Ok(Self {
                    image_id: payload.image_id,
                    owner_id: payload.user_id,
                    operations: payload.to_operations(),
                    variant: payload.strategy.variant_type(),
                })
            }
            other => Err(PipelineError::validation(format!(
                "{} is not an image job",
                other
            ))),
        }
    }
}

#[async_trait]
impl JobExecutor for ImageExecutor {
    #[tracing::instrument(skip_all, fields(job.id = %job.id, job.type = %job.job_type))]
    async fn execute(
        &self,
        ctx: &PipelineContext,
        job: &Job,
        _progress: ProgressSender,
    ) -> PipelineResult<serde_json::Value> {
        let ImageJob {
            image_id,
            owner_id,
            operations,
            variant,
        } = ImageJob::from_job(job)?;
        operations.validate()?;

        let (_, source_path) = ctx
            .resolve_source(MediaKind::Image, image_id, owner_id)
            .await?;

        let output_dir = ctx.layout.variants_dir().to_path_buf();
        let ops = operations.clone();
        let output = tokio::task::spawn_blocking(move || {
            ImageTransformer::execute(&source_path, &ops, &output_dir, variant)
        })
        .await
        .map_err(|e| PipelineError::processing("image worker", e))??;

        let filename = output
            .output_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let storage_path = ctx.layout.storage_path(&output.output_path);

        let mut parameters = serde_json::to_value(&operations)?;
        if let (Some(selection), Some(obj)) = (&output.crop, parameters.as_object_mut()) {
            obj.insert("selectedRegion".to_string(), serde_json::to_value(selection)?);
        }

        let derived = DerivedVariant::new(
            Some(image_id),
            owner_id,
            variant,
            filename,
            storage_path,
            output.byte_size,
            output.mime_type.clone(),
        )
        .with_dimensions(output.width, output.height)
        .with_parameters(parameters);

        ctx.catalog
            .record_variant(&derived)
            .await
            .map_err(|e| PipelineError::processing("record variant", e))?;

        let mut result = json!({
            "variantId": derived.id,
            "imageId": image_id,
            "variantType": variant,
            "filename": derived.filename,
            "storagePath": derived.storage_path,
            "width": output.width,
            "height": output.height,
            "byteSize": output.byte_size,
            "mimeType": output.mime_type,
        });
        if let (Some(selection), Some(obj)) = (&output.crop, result.as_object_mut()) {
            obj.insert("cropRegion".to_string(), serde_json::to_value(selection.region)?);
            obj.insert("score".to_string(), json!(selection.score));
        }
        Ok(result)
    }
}
