use async_trait::async_trait;
use serde_json::json;

use lumio_core::models::{DerivedVariant, Job, MediaKind, VariantType, ZipCreatePayload};
use lumio_core::{PipelineError, PipelineResult};
use lumio_processing::archive::{self, ArchiveEntry};

use crate::context::PipelineContext;
use crate::executor::{JobExecutor, ProgressSender};

/// ZIP_CREATE. Images that cannot be resolved are skipped like missing files.
pub struct ArchiveExecutor;

#[async_trait]
impl JobExecutor for ArchiveExecutor {
    #[tracing::instrument(skip_all, fields(job.id = %job.id, job.type = %job.job_type))]
    async fn execute(
        &self,
        ctx: &PipelineContext,
        job: &Job,
        _progress: ProgressSender,
    ) -> PipelineResult<serde_json::Value> {
        let payload: ZipCreatePayload = job.try_payload_as()?;
        if payload.image_ids.is_empty() {
            return Err(PipelineError::validation("imageIds must not be empty"));
        }

        let mut entries = Vec::with_capacity(payload.image_ids.len());
        let mut unresolved = Vec::new();
        for image_id in &payload.image_ids {
            match ctx
                .resolve_source(MediaKind::Image, *image_id, payload.user_id)
                .await
            {
                Ok((media, path)) => entries.push(
                    ArchiveEntry::new(path, media.filename.clone()).with_metadata(json!({
                        "imageId": media.id,
                        "originalFilename": media.filename,
                        "mimeType": media.mime_type,
                    })),
                ),
                Err(e @ PipelineError::SourceNotFound(_)) => {
                    tracing::warn!(image_id = %image_id, error = %e, "Skipping unresolved archive image");
                    unresolved.push(*image_id);
                }
                Err(e) => return Err(e),
            }
        }

        if entries.is_empty() {
            return Err(PipelineError::archive(format!(
                "none of the {} requested images could be resolved",
                payload.image_ids.len()
            )));
        }

        let archive_dir = ctx.layout.archives_dir().to_path_buf();
        let archive_name = payload.archive_name.clone();
        let include_metadata = payload.include_metadata;
        let output = tokio::task::spawn_blocking(move || {
            archive::build(&entries, &archive_dir, &archive_name, include_metadata)
        })
        .await
        .map_err(|e| PipelineError::archive(format!("archive worker failed: {}", e)))??;

        let filename = output
            .archive_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let storage_path = ctx.layout.storage_path(&output.archive_path);

        let derived = DerivedVariant::new(
            None,
            payload.user_id,
            VariantType::Zip,
            filename,
            storage_path,
            output.byte_size,
            "application/zip",
        )
        .with_parameters(json!({
            "archiveName": payload.archive_name,
            "imageIds": payload.image_ids,
            "includeMetadata": payload.include_metadata,
        }));

        ctx.catalog
            .record_variant(&derived)
            .await
            .map_err(|e| PipelineError::processing("record variant", e))?;

        Ok(json!({
            "variantId": derived.id,
            "variantType": VariantType::Zip,
            "archiveName": payload.archive_name,
            "filename": derived.filename,
            "archivePath": derived.storage_path,
            "byteSize": output.byte_size,
            "includedCount": output.included_count,
            "requestedCount": payload.image_ids.len(),
            "skippedCount": output.skipped.len() + unresolved.len(),
        }))
    }
}
