use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use uuid::Uuid;

use lumio_core::models::{Job, JobFamily};
use lumio_core::ErrorKind;

/// Durable job records.
///
/// `claim_next` is the only way a job leaves PENDING and must hand any job to
/// exactly one caller. Terminal writes only succeed from PROCESSING; anything
/// else is an error rather than an overwrite.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &Job) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>>;

    /// Atomically move the oldest PENDING job of `family` to PROCESSING.
    async fn claim_next(&self, family: JobFamily) -> Result<Option<Job>>;

    /// Best-effort progress update; ignored unless the job is PROCESSING.
    async fn set_progress(&self, id: Uuid, percent: u8) -> Result<()>;

    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> Result<Job>;

    async fn mark_failed(&self, id: Uuid, kind: ErrorKind, message: &str) -> Result<Job>;

    /// Fail PROCESSING jobs not updated within `grace`. Returns the failed ids.
    async fn fail_stale(&self, grace: Duration) -> Result<Vec<Uuid>>;
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    job_type: String,
    status: String,
    owner_id: Uuid,
    payload: serde_json::Value,
    result: Option<serde_json::Value>,
    error_kind: Option<String>,
    error: Option<String>,
    progress: Option<i16>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = anyhow::Error;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Job {
            id: row.id,
            job_type: row.job_type.parse()?,
            status: row.status.parse()?,
            owner_id: row.owner_id,
            payload: row.payload,
            result: row.result,
            error_kind: row.error_kind.as_deref().map(str::parse::<ErrorKind>)
                .transpose()?,
            error: row.error,
            progress: row.progress.map(|p| p.clamp(0, 100) as u8),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, job_type, status, owner_id, payload, result, error_kind, error, progress, created_at, updated_at";

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[tracing::instrument(skip(self, job), fields(job.id = %job.id, job.type = %job.job_type))]
    async fn insert(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, status, owner_id, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id)
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(job.owner_id)
        .bind(&job.payload)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert job")?;

        tracing::debug!("Job inserted");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as::<Postgres, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch job")?;

        row.map(Job::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(family = %family))]
    async fn claim_next(&self, family: JobFamily) -> Result<Option<Job>> {
        let types: Vec<String> = family
            .job_types()
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();

        // Row lock plus SKIP LOCKED: concurrent claimers never see the same row.
        let row: Option<JobRow> = sqlx::query_as::<Postgres, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET status = 'processing',
                updated_at = NOW()
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = 'pending'
                    AND job_type = ANY($1)
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(&types)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to claim next job")?;

        let job = row.map(Job::try_from).transpose()?;
        if let Some(job) = &job {
            tracing::debug!(job.id = %job.id, job.type = %job.job_type, "Job claimed");
        }
        Ok(job)
    }

    async fn set_progress(&self, id: Uuid, percent: u8) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET progress = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(percent.min(100) as i16)
        .execute(&self.pool)
        .await
        .context("Failed to update job progress")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, result))]
    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as::<Postgres, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET status = 'completed',
                result = $2,
                progress = 100,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(result)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to mark job as completed")?;

        let row = row.ok_or_else(|| {
            anyhow::anyhow!("Job {} is not processing; refusing to mark completed", id)
        })?;
        let job = Job::try_from(row)?;
        tracing::info!(job.id = %id, job.type = %job.job_type, "Job completed");
        Ok(job)
    }

    #[tracing::instrument(skip(self, message))]
    async fn mark_failed(&self, id: Uuid, kind: ErrorKind, message: &str) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as::<Postgres, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET status = 'failed',
                error_kind = $2,
                error = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(kind.as_str())
        .bind(message)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to mark job as failed")?;

        let row = row.ok_or_else(|| {
            anyhow::anyhow!("Job {} is not processing; refusing to mark failed", id)
        })?;
        let job = Job::try_from(row)?;
        tracing::error!(job.id = %id, job.type = %job.job_type, error.kind = %kind, "Job failed");
        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    async fn fail_stale(&self, grace: Duration) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET status = 'failed',
                error_kind = 'timeout',
                error = 'worker stopped reporting; job abandoned',
                updated_at = NOW()
            WHERE status = 'processing'
                AND updated_at < NOW() - make_interval(secs => $1::double precision)
            RETURNING id
            "#,
        )
        .bind(grace.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .context("Failed to reap stale jobs")?;

        if !ids.is_empty() {
            tracing::warn!(count = ids.len(), "Failed stale processing jobs");
        }
        Ok(ids)
    }
}
