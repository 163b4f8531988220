//! In-memory job store and catalog
//!
//! Same contracts as the PostgreSQL repositories, guarded by a mutex. The job
//! store also keeps every status each job has been in, which the pipeline
//! tests use to check that persisted state never moves backwards.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use lumio_core::models::{DerivedVariant, Job, JobFamily, JobStatus, MediaKind, SourceMedia};
use lumio_core::ErrorKind;

use super::{JobStore, MediaCatalog};

#[derive(Default)]
struct JobTable {
    jobs: HashMap<Uuid, Job>,
    /// Insertion order, used for oldest-first claims.
    order: Vec<Uuid>,
    history: HashMap<Uuid, Vec<JobStatus>>,
}

impl JobTable {
    fn transition(&mut self, id: Uuid, next: JobStatus) -> Result<&mut Job> {
        let job = self
            .jobs
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("Job {} not found", id))?;
        if !job.status.can_transition_to(next) {
            anyhow::bail!(
                "Job {} is {}; refusing transition to {}",
                id,
                job.status,
                next
            );
        }
        job.status = next;
        job.updated_at = Utc::now();
        self.history.entry(id).or_default().push(next);
        Ok(job)
    }
}

#[derive(Default)]
pub struct MemoryJobStore {
    table: Mutex<JobTable>,
    unavailable: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, JobTable>> {
        self.table
            .lock()
            .map_err(|_| anyhow::anyhow!("Job table lock poisoned"))
    }

    /// Make subsequent inserts fail, as an unreachable database would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every status the job has been persisted with, oldest first.
    pub fn status_history(&self, id: Uuid) -> Vec<JobStatus> {
        self.lock()
            .map(|t| t.history.get(&id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|t| t.jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move a job's `updated_at` into the past.
    pub fn backdate(&self, id: Uuid, by: Duration) -> Result<()> {
        let mut table = self.lock()?;
        let job = table
            .jobs
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("Job {} not found", id))?;
        let by = chrono::Duration::from_std(by).context("Backdate out of range")?;
        job.updated_at -= by;
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("Job store unavailable");
        }
        let mut table = self.lock()?;
        if table.jobs.contains_key(&job.id) {
            anyhow::bail!("Job {} already exists", job.id);
        }
        table.order.push(job.id);
        table.history.insert(job.id, vec![job.status]);
        table.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.lock()?.jobs.get(&id).cloned())
    }

    async fn claim_next(&self, family: JobFamily) -> Result<Option<Job>> {
        let mut table = self.lock()?;
        let next = table.order.iter().copied().find(|id| {
            table
                .jobs
                .get(id)
                .map(|j| j.status == JobStatus::Pending && j.family() == family)
                .unwrap_or(false)
        });
        match next {
            Some(id) => {
                let job = table.transition(id, JobStatus::Processing)?;
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set_progress(&self, id: Uuid, percent: u8) -> Result<()> {
        let mut table = self.lock()?;
        if let Some(job) = table.jobs.get_mut(&id) {
            if job.status == JobStatus::Processing {
                job.progress = Some(percent.min(100));
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> Result<Job> {
        let mut table = self.lock()?;
        let job = table.transition(id, JobStatus::Completed)?;
        job.result = Some(result);
        job.progress = Some(100);
        Ok(job.clone())
    }

    async fn mark_failed(&self, id: Uuid, kind: ErrorKind, message: &str) -> Result<Job> {
        let mut table = self.lock()?;
        let job = table.transition(id, JobStatus::Failed)?;
        job.error_kind = Some(kind);
        job.error = Some(message.to_string());
        Ok(job.clone())
    }

    async fn fail_stale(&self, grace: Duration) -> Result<Vec<Uuid>> {
        let grace = chrono::Duration::from_std(grace).context("Grace period out of range")?;
        let cutoff = Utc::now() - grace;
        let mut table = self.lock()?;
        let stale: Vec<Uuid> = table
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Processing && j.updated_at < cutoff)
            .map(|j| j.id)
            .collect();
        for id in &stale {
            let job = table.transition(*id, JobStatus::Failed)?;
            job.error_kind = Some(ErrorKind::Timeout);
            job.error = Some("worker stopped reporting; job abandoned".to_string());
        }
        Ok(stale)
    }
}

#[derive(Default)]
pub struct MemoryMediaCatalog {
    sources: Mutex<HashMap<Uuid, SourceMedia>>,
    variants: Mutex<Vec<DerivedVariant>>,
}

impl MemoryMediaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&self, media: SourceMedia) {
        if let Ok(mut sources) = self.sources.lock() {
            sources.insert(media.id, media);
        }
    }

    pub fn variants(&self) -> Vec<DerivedVariant> {
        self.variants.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn find(&self, id: Uuid, kind: MediaKind) -> Result<Option<SourceMedia>> {
        let sources = self
            .sources
            .lock()
            .map_err(|_| anyhow::anyhow!("Catalog lock poisoned"))?;
        Ok(sources.get(&id).filter(|m| m.kind == kind).cloned())
    }
}

#[async_trait]
impl MediaCatalog for MemoryMediaCatalog {
    async fn find_image(&self, id: Uuid) -> Result<Option<SourceMedia>> {
        self.find(id, MediaKind::Image)
    }

    async fn find_video(&self, id: Uuid) -> Result<Option<SourceMedia>> {
        self.find(id, MediaKind::Video)
    }

    async fn record_variant(&self, variant: &DerivedVariant) -> Result<()> {
        self.variants
            .lock()
            .map_err(|_| anyhow::anyhow!("Catalog lock poisoned"))?
            .push(variant.clone());
        Ok(())
    }

    async fn delete_variant(&self, id: Uuid) -> Result<Option<String>> {
        let mut variants = self
            .variants
            .lock()
            .map_err(|_| anyhow::anyhow!("Catalog lock poisoned"))?;
        let removed = variants
            .iter()
            .position(|v| v.id == id)
            .map(|index| variants.remove(index).storage_path);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumio_core::models::{JobType, VariantType};
    use serde_json::json;

    fn job(job_type: JobType) -> Job {
        Job::new(job_type, Uuid::new_v4(), json!({}))
    }

    #[tokio::test]
    async fn test_claim_is_oldest_first_within_family() {
        let store = MemoryJobStore::new();
        let video = job(JobType::VideoProcess);
        let first = job(JobType::ImageCrop);
        let second = job(JobType::ImageResize);
        store.insert(&video).await.unwrap();
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();

        let claimed = store.claim_next(JobFamily::Image).await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, JobStatus::Processing);

        let claimed = store.claim_next(JobFamily::Image).await.unwrap().unwrap();
        assert_eq!(claimed.id, second.id);

        assert!(store.claim_next(JobFamily::Image).await.unwrap().is_none());
        assert!(store.claim_next(JobFamily::Archive).await.unwrap().is_none());
        assert_eq!(
            store.claim_next(JobFamily::Video).await.unwrap().unwrap().id,
            video.id
        );
    }

    #[tokio::test]
    async fn test_each_job_claimed_once_under_contention() {
        let store = std::sync::Arc::new(MemoryJobStore::new());
        for _ in 0..20 {
            store.insert(&job(JobType::ImageCrop)).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut mine = Vec::new();
                while let Some(j) = store.claim_next(JobFamily::Image).await.unwrap() {
                    mine.push(j.id);
                }
                mine
            }));
        }

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        let unique: std::collections::HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), 20);
        assert_eq!(unique.len(), 20);
    }

    #[tokio::test]
    async fn test_terminal_write_requires_processing() {
        let store = MemoryJobStore::new();
        let j = job(JobType::ZipCreate);
        store.insert(&j).await.unwrap();

        assert!(store.mark_completed(j.id, json!({})).await.is_err());

        store.claim_next(JobFamily::Archive).await.unwrap();
        let done = store
            .mark_completed(j.id, json!({"includedCount": 1}))
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);

        assert!(store
            .mark_failed(j.id, ErrorKind::Archive, "late failure")
            .await
            .is_err());
        assert_eq!(
            store.status_history(j.id),
            vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Completed]
        );
    }

    #[tokio::test]
    async fn test_progress_only_while_processing() {
        let store = MemoryJobStore::new();
        let j = job(JobType::VideoProcess);
        store.insert(&j).await.unwrap();

        store.set_progress(j.id, 40).await.unwrap();
        assert_eq!(store.get(j.id).await.unwrap().unwrap().progress, None);

        store.claim_next(JobFamily::Video).await.unwrap();
        store.set_progress(j.id, 40).await.unwrap();
        assert_eq!(store.get(j.id).await.unwrap().unwrap().progress, Some(40));
    }

    #[tokio::test]
    async fn test_fail_stale_only_touches_old_processing_jobs() {
        let store = MemoryJobStore::new();
        let stale = job(JobType::VideoProcess);
        let fresh = job(JobType::VideoProcess);
        let pending = job(JobType::ImageCrop);
        for j in [&stale, &fresh, &pending] {
            store.insert(j).await.unwrap();
        }
        store.claim_next(JobFamily::Video).await.unwrap();
        store.claim_next(JobFamily::Video).await.unwrap();
        store.backdate(stale.id, Duration::from_secs(3600)).unwrap();
        store.backdate(pending.id, Duration::from_secs(3600)).unwrap();

        let failed = store.fail_stale(Duration::from_secs(600)).await.unwrap();
        assert_eq!(failed, vec![stale.id]);

        let reaped = store.get(stale.id).await.unwrap().unwrap();
        assert_eq!(reaped.status, JobStatus::Failed);
        assert_eq!(reaped.error_kind, Some(ErrorKind::Timeout));
        assert_eq!(
            store.get(fresh.id).await.unwrap().unwrap().status,
            JobStatus::Processing
        );
        assert_eq!(
            store.get(pending.id).await.unwrap().unwrap().status,
            JobStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_unavailable_store_rejects_insert() {
        let store = MemoryJobStore::new();
        store.set_unavailable(true);
        assert!(store.insert(&job(JobType::ImageCrop)).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_separates_kinds() {
        let catalog = MemoryMediaCatalog::new();
        let id = Uuid::new_v4();
        catalog.add_source(SourceMedia {
            id,
            owner_id: Uuid::new_v4(),
            kind: MediaKind::Image,
            path: "a.jpg".to_string(),
            filename: "a.jpg".to_string(),
            mime_type: None,
        });
        assert!(catalog.find_image(id).await.unwrap().is_some());
        assert!(catalog.find_video(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_variant() {
        let catalog = MemoryMediaCatalog::new();
        let variant = DerivedVariant::new(
            None,
            Uuid::new_v4(),
            VariantType::Zip,
            "export.zip".to_string(),
            "archives/export.zip".to_string(),
            10,
            "application/zip",
        );
        catalog.record_variant(&variant).await.unwrap();

        assert_eq!(
            catalog.delete_variant(variant.id).await.unwrap().as_deref(),
            Some("archives/export.zip")
        );
        assert!(catalog.variants().is_empty());
        assert!(catalog.delete_variant(variant.id).await.unwrap().is_none());
    }
}
