//! Job queue: per-family worker pools, retry with backoff, timeouts and submission.
//!
//! Each family (image, video, archive) has its own pool loop, semaphore and
//! wake-up signal, so a long transcode never holds up image jobs. Retries happen
//! inside the worker that claimed the job; the persisted record only ever moves
//! `PENDING -> PROCESSING -> COMPLETED | FAILED`.
//!
//! Shutdown: [`JobQueue::shutdown`] stops the pools from claiming; jobs already
//! running keep going. [`JobQueue::drain`] waits for them with a deadline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use lumio_core::models::{Job, JobFamily, JobRequest, JobStatusView};
use lumio_core::{PipelineError, PipelineResult};
use lumio_db::JobStore;

use crate::context::PipelineContext;
use crate::executor::ExecutorRegistry;
use crate::policy::{FamilyPolicy, JobQueueConfig};

type Wakers = Arc<HashMap<JobFamily, Arc<Notify>>>;

/// Submission and status handle. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    jobs: Arc<dyn JobStore>,
    wakers: Wakers,
    shutdown_tx: Arc<watch::Sender<bool>>,
    /// Jobs currently running in this process.
    active: Arc<watch::Sender<usize>>,
}

impl JobQueue {
    /// Start one pool per family plus the stale-job reaper.
    pub fn start(
        ctx: Arc<PipelineContext>,
        registry: ExecutorRegistry,
        config: JobQueueConfig,
    ) -> Self {
        let queue = Self::new_no_worker(ctx.jobs.clone());
        let registry = Arc::new(registry);

        let longest_timeout = JobFamily::ALL
            .iter()
            .map(|f| config.policy(*f).timeout)
            .max()
            .unwrap_or_default();
        if !config.stale_reap_interval.is_zero() && config.stale_grace < longest_timeout {
            tracing::warn!(
                grace_secs = config.stale_grace.as_secs(),
                longest_timeout_secs = longest_timeout.as_secs(),
                "Stale-job grace period is shorter than a job timeout; running jobs may be reaped"
            );
        }

        for family in JobFamily::ALL {
            let pool = FamilyPool {
                family,
                policy: config.policy(family).clone(),
                poll_interval: config.poll_interval,
                ctx: ctx.clone(),
                registry: registry.clone(),
                wake: queue.waker(family),
                active: queue.active.clone(),
            };
            tokio::spawn(pool.run(queue.shutdown_tx.subscribe()));
        }

        if !config.stale_reap_interval.is_zero() {
            tokio::spawn(reap_stale_jobs(
                ctx.jobs.clone(),
                config.stale_reap_interval,
                config.stale_grace,
                queue.shutdown_tx.subscribe(),
            ));
        }

        queue
    }

    /// Queue handle that only submits and reads status; jobs are picked up by
    /// whichever process runs the pools.
    pub fn new_no_worker(jobs: Arc<dyn JobStore>) -> Self {
        let wakers = JobFamily::ALL
            .into_iter()
            .map(|family| (family, Arc::new(Notify::new())))
            .collect();
        let (shutdown_tx, _) = watch::channel(false);
        let (active, _) = watch::channel(0usize);
        Self {
            jobs,
            wakers: Arc::new(wakers),
            shutdown_tx: Arc::new(shutdown_tx),
            active: Arc::new(active),
        }
    }

    fn waker(&self, family: JobFamily) -> Arc<Notify> {
        match self.wakers.get(&family) {
            Some(notify) => notify.clone(),
            None => Arc::new(Notify::new()),
        }
    }

    /// Persist a PENDING job and return its id without waiting for it to run.
    #[tracing::instrument(skip(self, request), fields(job.type = %request.job_type()))]
    pub async fn submit(&self, request: JobRequest) -> PipelineResult<Uuid> {
        let job_type = request.job_type();
        let payload = request.to_payload()?;
        let job = Job::new(job_type, request.owner_id(), payload);

        self.jobs.insert(&job).await.map_err(|e| {
            tracing::error!(error = %e, job_type = %job_type, "Failed to enqueue job");
            PipelineError::queue_unavailable(e)
        })?;

        if let Some(notify) = self.wakers.get(&job_type.family()) {
            notify.notify_one();
        }
        tracing::info!(job_id = %job.id, job_type = %job_type, "Job submitted to queue");
        Ok(job.id)
    }

    pub async fn status(&self, id: Uuid) -> PipelineResult<JobStatusView> {
        let job = self
            .jobs
            .get(id)
            .await
            .map_err(PipelineError::queue_unavailable)?
            .ok_or_else(|| PipelineError::source_not_found(format!("job {}", id)))?;
        Ok(job.into())
    }

    /// Stop claiming new jobs. Returns immediately; in-flight jobs keep running.
    pub fn shutdown(&self) {
        tracing::info!("Initiating job queue shutdown");
        self.shutdown_tx.send_replace(true);
    }

    /// Wait until no job is running here, for at most `timeout`. Returns
    /// whether everything finished. Jobs cut off by process exit stay
    /// PROCESSING until the stale-job reaper fails them.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let mut rx = self.active.subscribe();
        let drained = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|running| *running == 0)).await,
            Ok(Ok(_))
        );
        drained
    }
}

struct FamilyPool {
    family: JobFamily,
    policy: FamilyPolicy,
    poll_interval: Duration,
    ctx: Arc<PipelineContext>,
    registry: Arc<ExecutorRegistry>,
    wake: Arc<Notify>,
    active: Arc<watch::Sender<usize>>,
}

impl FamilyPool {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let workers = self.policy.workers.max(1);
        tracing::info!(
            family = %self.family,
            workers,
            max_attempts = self.policy.max_attempts,
            timeout_secs = self.policy.timeout.as_secs(),
            "Worker pool started"
        );
        let semaphore = Arc::new(Semaphore::new(workers));
        let this = Arc::new(self);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            this.clone().claim_available(&semaphore).await;

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = this.wake.notified() => {}
                _ = sleep(this.poll_interval) => {}
            }
        }

        tracing::info!(family = %this.family, "Worker pool stopped");
    }

    /// Claim jobs until the pool is full or the family has nothing pending.
    async fn claim_available(self: Arc<Self>, semaphore: &Arc<Semaphore>) {
        loop {
            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::trace!(family = %self.family, "No workers available, skipping claim");
                    return;
                }
            };

            match self.ctx.jobs.claim_next(self.family).await {
                Ok(Some(job)) => {
                    let pool = self.clone();
                    let slot = InFlight::enter(permit, pool.active.clone(), pool.wake.clone());
                    tokio::spawn(async move {
                        let _slot = slot;
                        pool.process_job(job).await;
                    });
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(family = %self.family, error = %e, "Failed to claim job from queue");
                    return;
                }
            }
        }
    }

    #[tracing::instrument(skip(self, job), fields(job.id = %job.id, job.type = %job.job_type, family = %self.family))]
    async fn process_job(&self, job: Job) {
        let outcome = self.run_attempts(&job).await;
        let jobs = &self.ctx.jobs;

        match outcome {
            Ok(result) => {
                let variant_id = result
                    .get("variantId")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse::<Uuid>().ok());
                match jobs.mark_completed(job.id, result).await {
                    Ok(_) => tracing::info!("Job completed successfully"),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to mark job as completed");
                        if let Some(id) = variant_id {
                            self.discard_variant(id).await;
                        }
                    }
                }
            }
            Err(err) => {
                if let Err(e) = jobs.mark_failed(job.id, err.kind(), &err.to_string()).await {
                    tracing::error!(error = %e, "Failed to mark job as failed");
                }
            }
        }
    }

    /// Unlink the variant of a job that could not be completed, then remove
    /// its file.
    async fn discard_variant(&self, id: Uuid) {
        match self.ctx.catalog.delete_variant(id).await {
            Ok(Some(storage_path)) => {
                let path = self.ctx.layout.uploads_root().join(&storage_path);
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove orphaned variant file");
                }
                tracing::warn!(variant_id = %id, storage_path = %storage_path, "Discarded variant of uncompleted job");
            }
            Ok(None) => {}
            Err(e) => tracing::error!(variant_id = %id, error = %e, "Failed to discard variant"),
        }
    }

    /// Run the executor until it succeeds, fails terminally or runs out of attempts.
    async fn run_attempts(&self, job: &Job) -> PipelineResult<serde_json::Value> {
        let executor = self.registry.get(job.job_type).ok_or_else(|| {
            PipelineError::validation(format!("no executor registered for {}", job.job_type))
        })?;

        let mut attempt = 1;
        loop {
            let (progress_tx, progress_rx) = watch::channel(0u8);
            let forwarder = tokio::spawn(forward_progress(
                self.ctx.jobs.clone(),
                job.id,
                progress_rx,
            ));

            // Own task per attempt so a panicking executor fails the job
            // instead of unwinding the worker.
            let mut attempt_task = tokio::spawn({
                let executor = executor.clone();
                let ctx = self.ctx.clone();
                let job = job.clone();
                async move { executor.execute(&ctx, &job, progress_tx).await }
            });

            let result = match tokio::time::timeout(self.policy.timeout, &mut attempt_task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(PipelineError::processing("executor panicked", join_err)),
                Err(_) => {
                    // Dropping the executor future kills any ffmpeg child.
                    attempt_task.abort();
                    Err(PipelineError::Timeout {
                        seconds: self.policy.timeout.as_secs(),
                    })
                }
            };
            // The sender is gone either way; wait for the last progress write.
            let _ = forwarder.await;

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if err.is_recoverable() && attempt < self.policy.max_attempts {
                let delay = self.policy.backoff(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Job attempt failed, scheduling retry"
                );
                sleep(delay).await;
                attempt += 1;
                continue;
            }

            tracing::error!(
                attempt,
                error_code = err.error_code(),
                recoverable = err.is_recoverable(),
                error = %err,
                "Job failed"
            );
            return Err(err);
        }
    }
}

/// One running job: holds the worker slot and counts toward [`JobQueue::drain`].
/// Released on drop, so a job that unwinds still frees its slot.
struct InFlight {
    permit: Option<OwnedSemaphorePermit>,
    active: Arc<watch::Sender<usize>>,
    wake: Arc<Notify>,
}

impl InFlight {
    fn enter(
        permit: OwnedSemaphorePermit,
        active: Arc<watch::Sender<usize>>,
        wake: Arc<Notify>,
    ) -> Self {
        active.send_modify(|running| *running += 1);
        Self {
            permit: Some(permit),
            active,
            wake,
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        drop(self.permit.take());
        self.active
            .send_modify(|running| *running = running.saturating_sub(1));
        // A slot just freed up.
        self.wake.notify_one();
    }
}

async fn forward_progress(jobs: Arc<dyn JobStore>, id: Uuid, mut rx: watch::Receiver<u8>) {
    while rx.changed().await.is_ok() {
        let percent = *rx.borrow_and_update();
        if let Err(e) = jobs.set_progress(id, percent).await {
            tracing::debug!(job_id = %id, error = %e, "Failed to record job progress");
        }
    }
}

async fn reap_stale_jobs(
    jobs: Arc<dyn JobStore>,
    every: Duration,
    grace: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match jobs.fail_stale(grace).await {
                    Ok(reaped) if !reaped.is_empty() => {
                        tracing::warn!(count = reaped.len(), job_ids = ?reaped, "Failed stale processing jobs");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Stale job reaper failed"),
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
