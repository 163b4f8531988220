use async_trait::async_trait;
use serde_json::json;

use lumio_core::models::{DerivedVariant, Job, MediaKind, VariantType, VideoProcessPayload};
use lumio_core::{PipelineError, PipelineResult};

use crate::context::PipelineContext;
use crate::executor::{JobExecutor, ProgressSender};

/// VIDEO_PROCESS through ffmpeg. Reports percent progress while transcoding.
pub struct VideoExecutor;

#[async_trait]
impl JobExecutor for VideoExecutor {
    #[tracing::instrument(skip_all, fields(job.id = %job.id, job.type = %job.job_type))]
    async fn execute(
        &self,
        ctx: &PipelineContext,
        job: &Job,
        progress: ProgressSender,
    ) -> PipelineResult<serde_json::Value> {
        let payload: VideoProcessPayload = job.try_payload_as()?;
        payload.operations.validate()?;

        let (_, source_path) = ctx
            .resolve_source(MediaKind::Video, payload.video_id, payload.user_id)
            .await?;

        let output = ctx
            .video
            .execute(
                &source_path,
                &payload.operations,
                ctx.layout.variants_dir(),
                Some(progress),
            )
            .await?;

        let filename = output
            .output_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let storage_path = ctx.layout.storage_path(&output.output_path);

        let mut derived = DerivedVariant::new(
            Some(payload.video_id),
            payload.user_id,
            VariantType::Video,
            filename,
            storage_path,
            output.byte_size,
            output.mime_type.clone(),
        )
        .with_dimensions(output.width, output.height)
        .with_parameters(serde_json::to_value(&payload.operations)?);
        derived.duration_seconds = Some(output.duration_seconds);
        derived.resolution = Some(output.resolution.clone());

        ctx.catalog
            .record_variant(&derived)
            .await
            .map_err(|e| PipelineError::processing("record variant", e))?;

        Ok(json!({
            "variantId": derived.id,
            "videoId": payload.video_id,
            "variantType": VariantType::Video,
            "filename": derived.filename,
            "storagePath": derived.storage_path,
            "durationSeconds": output.duration_seconds,
            "resolution": output.resolution,
            "byteSize": output.byte_size,
            "mimeType": output.mime_type,
        }))
    }
}
