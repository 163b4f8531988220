//! Pipeline context
//!
//! Everything an executor needs, constructed once at startup and passed
//! explicitly: the job store, the media catalog, the filesystem layout and the
//! transcoder settings.

use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use lumio_core::models::{MediaKind, SourceMedia};
use lumio_core::{PipelineConfig, PipelineError, PipelineResult};
use lumio_db::{JobStore, MediaCatalog};
use lumio_processing::video::VideoTransformer;
use lumio_processing::StorageLayout;

pub struct PipelineContext {
    pub jobs: Arc<dyn JobStore>,
    pub catalog: Arc<dyn MediaCatalog>,
    pub layout: StorageLayout,
    pub video: VideoTransformer,
}

impl PipelineContext {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn MediaCatalog>,
        layout: StorageLayout,
        video: VideoTransformer,
    ) -> Self {
        Self {
            jobs,
            catalog,
            layout,
            video,
        }
    }

    pub fn from_config(
        config: &PipelineConfig,
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn MediaCatalog>,
    ) -> Self {
        Self::new(
            jobs,
            catalog,
            StorageLayout::from_config(config),
            VideoTransformer::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone()),
        )
    }

    /// Look up a source row owned by `owner_id` and resolve its file path.
    /// A missing row and a row owned by someone else are indistinguishable.
    pub async fn resolve_source(
        &self,
        kind: MediaKind,
        id: Uuid,
        owner_id: Uuid,
    ) -> PipelineResult<(SourceMedia, PathBuf)> {
        let found = match kind {
            MediaKind::Image => self.catalog.find_image(id).await,
            MediaKind::Video => self.catalog.find_video(id).await,
        }
        .map_err(|e| PipelineError::processing(format!("load {} {}", kind, id), e))?;

        let media = found
            .filter(|m| m.is_owned_by(owner_id))
            .ok_or_else(|| PipelineError::source_not_found(format!("{} {}", kind, id)))?;
        let path = self.layout.resolve_source(&media.path)?;
        Ok((media, path))
    }
}
