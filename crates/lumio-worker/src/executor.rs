//! Job executors and the job type → executor table.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use lumio_core::models::{Job, JobType};
use lumio_core::PipelineResult;

use crate::context::PipelineContext;
use crate::executors::{ArchiveExecutor, ImageExecutor, VideoExecutor};

/// Percent-complete side channel. Executors that cannot report progress
/// just drop it.
pub type ProgressSender = watch::Sender<u8>;

#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Run one attempt of `job`, returning the JSON result stored on success.
    async fn execute(
        &self,
        ctx: &PipelineContext,
        job: &Job,
        progress: ProgressSender,
    ) -> PipelineResult<serde_json::Value>;
}

#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<JobType, Arc<dyn JobExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in executor for every job type.
    pub fn with_defaults() -> Self {
        let image: Arc<dyn JobExecutor> = Arc::new(ImageExecutor);
        Self::new()
            .register(JobType::ImageCrop, image.clone())
            .register(JobType::ImageResize, image.clone())
            .register(JobType::ImageSmartCrop, image)
            .register(JobType::VideoProcess, Arc::new(VideoExecutor))
            .register(JobType::ZipCreate, Arc::new(ArchiveExecutor))
    }

    /// Add or replace the executor for `job_type`.
    pub fn register(mut self, job_type: JobType, executor: Arc<dyn JobExecutor>) -> Self {
        self.executors.insert(job_type, executor);
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobExecutor>> {
        self.executors.get(&job_type).cloned()
    }
}
