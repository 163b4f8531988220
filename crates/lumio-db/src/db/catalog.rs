use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use lumio_core::models::{DerivedVariant, MediaKind, SourceMedia};

/// Lookup of uploaded sources and the sink for derived variants.
///
/// Lookups return the row regardless of owner; callers check ownership so a
/// mismatch and a missing row can be reported the same way.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    async fn find_image(&self, id: Uuid) -> Result<Option<SourceMedia>>;

    async fn find_video(&self, id: Uuid) -> Result<Option<SourceMedia>>;

    async fn record_variant(&self, variant: &DerivedVariant) -> Result<()>;

    /// Remove a recorded variant. Returns its storage path if it existed.
    async fn delete_variant(&self, id: Uuid) -> Result<Option<String>>;
}

#[derive(sqlx::FromRow)]
struct SourceRow {
    id: Uuid,
    user_id: Uuid,
    path: String,
    filename: String,
    mime_type: Option<String>,
}

impl SourceRow {
    fn into_media(self, kind: MediaKind) -> SourceMedia {
        SourceMedia {
            id: self.id,
            owner_id: self.user_id,
            kind,
            path: self.path,
            filename: self.filename,
            mime_type: self.mime_type,
        }
    }
}

#[derive(Clone)]
pub struct PgMediaCatalog {
    pool: PgPool,
}

impl PgMediaCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaCatalog for PgMediaCatalog {
    #[tracing::instrument(skip(self))]
    async fn find_image(&self, id: Uuid) -> Result<Option<SourceMedia>> {
        let row = sqlx::query_as::<Postgres, SourceRow>(
            "SELECT id, user_id, path, filename, mime_type FROM images WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch image")?;

        Ok(row.map(|r| r.into_media(MediaKind::Image)))
    }

    #[tracing::instrument(skip(self))]
    async fn find_video(&self, id: Uuid) -> Result<Option<SourceMedia>> {
        let row = sqlx::query_as::<Postgres, SourceRow>(
            "SELECT id, user_id, path, filename, mime_type FROM videos WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch video")?;

        Ok(row.map(|r| r.into_media(MediaKind::Video)))
    }

    #[tracing::instrument(skip(self, variant), fields(variant.id = %variant.id, variant.type = %variant.variant_type))]
    async fn record_variant(&self, variant: &DerivedVariant) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO derived_variants (
                id, source_id, owner_id, filename, storage_path, width, height,
                duration_seconds, resolution, byte_size, mime_type, variant_type,
                parameters, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(variant.id)
        .bind(variant.source_id)
        .bind(variant.owner_id)
        .bind(&variant.filename)
        .bind(&variant.storage_path)
        .bind(variant.width.map(|w| w as i32))
        .bind(variant.height.map(|h| h as i32))
        .bind(variant.duration_seconds)
        .bind(&variant.resolution)
        .bind(variant.byte_size as i64)
        .bind(&variant.mime_type)
        .bind(variant.variant_type.as_str())
        .bind(&variant.parameters)
        .bind(variant.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert derived variant")?;

        tracing::debug!(storage_path = %variant.storage_path, "Derived variant recorded");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_variant(&self, id: Uuid) -> Result<Option<String>> {
        let storage_path: Option<String> = sqlx::query_scalar(
            "DELETE FROM derived_variants WHERE id = $1 RETURNING storage_path",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to delete derived variant")?;
        Ok(storage_path)
    }
}
