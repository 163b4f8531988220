use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use lumio_core::PipelineConfig;
use lumio_db::{JobStore, MediaCatalog, PgJobStore, PgMediaCatalog};
use lumio_worker::telemetry::init_tracing;
use lumio_worker::{ExecutorRegistry, JobQueue, JobQueueConfig, PipelineContext};

/// How long shutdown waits for running jobs.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = PipelineConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        uploads_root = %config.uploads_root.display(),
        image_workers = config.image_workers,
        "Starting lumio worker"
    );

    tracing::info!("Connecting to database...");
    let pool = lumio_db::connect(&config.database_url, config.db_max_connections).await?;
    lumio_db::run_migrations(&pool).await?;

    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let catalog: Arc<dyn MediaCatalog> = Arc::new(PgMediaCatalog::new(pool));
    let ctx = Arc::new(PipelineContext::from_config(&config, jobs, catalog));

    for dir in [ctx.layout.variants_dir(), ctx.layout.archives_dir()] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let queue = JobQueue::start(
        ctx,
        ExecutorRegistry::with_defaults(),
        JobQueueConfig::from_pipeline_config(&config),
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    queue.shutdown();
    tracing::info!("Shutdown requested, waiting for running jobs");
    if !queue.drain(SHUTDOWN_GRACE).await {
        tracing::warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Jobs still running at exit; the stale-job reaper will fail them"
        );
    }

    Ok(())
}
