//! Repositories for the job table and the media catalog

pub mod catalog;
pub mod jobs;
pub mod memory;

pub use catalog::{MediaCatalog, PgMediaCatalog};
pub use jobs::{JobStore, PgJobStore};
pub use memory::{MemoryJobStore, MemoryMediaCatalog};

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Open a connection pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .connect(database_url)
        .await
        .context("Failed to connect to database")
}

/// Apply the embedded migrations.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");
    Ok(())
}
