//! Per-family concurrency, retry and timeout settings.

use std::time::Duration;

use lumio_core::models::JobFamily;
use lumio_core::PipelineConfig;

/// Upper bound on the delay between two attempts.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyPolicy {
    /// Concurrent jobs in this family's pool.
    pub workers: usize,
    /// Total executions of one job, first run included.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles for each further one.
    pub base_delay: Duration,
    /// Deadline for a single attempt.
    pub timeout: Duration,
}

impl FamilyPolicy {
    pub fn for_family(family: JobFamily) -> Self {
        match family {
            JobFamily::Image => Self {
                workers: 2,
                max_attempts: 3,
                base_delay: Duration::from_millis(500),
                timeout: Duration::from_secs(300),
            },
            JobFamily::Video => Self {
                workers: 1,
                max_attempts: 2,
                base_delay: Duration::from_secs(5),
                timeout: Duration::from_secs(3600),
            },
            JobFamily::Archive => Self {
                workers: 1,
                max_attempts: 2,
                base_delay: Duration::from_secs(2),
                timeout: Duration::from_secs(900),
            },
        }
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(MAX_RETRY_BACKOFF)
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    pub image: FamilyPolicy,
    pub video: FamilyPolicy,
    pub archive: FamilyPolicy,
    pub poll_interval: Duration,
    /// Zero disables the stale-job reaper.
    pub stale_reap_interval: Duration,
    pub stale_grace: Duration,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            image: FamilyPolicy::for_family(JobFamily::Image),
            video: FamilyPolicy::for_family(JobFamily::Video),
            archive: FamilyPolicy::for_family(JobFamily::Archive),
            poll_interval: Duration::from_millis(500),
            stale_reap_interval: Duration::from_secs(60),
            stale_grace: Duration::from_secs(7200),
        }
    }
}

impl JobQueueConfig {
    pub fn from_pipeline_config(config: &PipelineConfig) -> Self {
        let mut image = FamilyPolicy::for_family(JobFamily::Image)
            .with_timeout(Duration::from_secs(config.image_timeout_secs));
        image.workers = config.image_workers;
        Self {
            image,
            video: FamilyPolicy::for_family(JobFamily::Video)
                .with_timeout(Duration::from_secs(config.video_timeout_secs)),
            archive: FamilyPolicy::for_family(JobFamily::Archive)
                .with_timeout(Duration::from_secs(config.archive_timeout_secs)),
            poll_interval: config.poll_interval(),
            stale_reap_interval: Duration::from_secs(config.stale_reap_interval_secs),
            stale_grace: Duration::from_secs(config.stale_grace_secs),
        }
    }

    pub fn policy(&self, family: JobFamily) -> &FamilyPolicy {
        match family {
            JobFamily::Image => &self.image,
            JobFamily::Video => &self.video,
            JobFamily::Archive => &self.archive,
        }
    }

    pub fn policy_mut(&mut self, family: JobFamily) -> &mut FamilyPolicy {
        match family {
            JobFamily::Image => &mut self.image,
            JobFamily::Video => &mut self.video,
            JobFamily::Archive => &mut self.archive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_exponential_then_capped() {
        let image = FamilyPolicy::for_family(JobFamily::Image);
        assert_eq!(image.backoff(1), Duration::from_millis(500));
        assert_eq!(image.backoff(2), Duration::from_millis(1000));
        assert_eq!(image.backoff(3), Duration::from_millis(2000));
        assert_eq!(image.backoff(10), MAX_RETRY_BACKOFF);
        assert_eq!(image.backoff(u32::MAX), MAX_RETRY_BACKOFF);

        let video = FamilyPolicy::for_family(JobFamily::Video);
        assert_eq!(video.backoff(1), Duration::from_secs(5));
        assert_eq!(video.backoff(2), Duration::from_secs(10));
    }

    #[test]
    fn family_limits() {
        let config = JobQueueConfig::default();
        assert_eq!(config.policy(JobFamily::Image).max_attempts, 3);
        assert_eq!(config.policy(JobFamily::Video).max_attempts, 2);
        assert_eq!(config.policy(JobFamily::Archive).max_attempts, 2);
        assert_eq!(config.policy(JobFamily::Video).workers, 1);
        assert_eq!(config.policy(JobFamily::Archive).workers, 1);
    }

    #[test]
    fn from_pipeline_config() {
        let pipeline = PipelineConfig::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/lumio".to_string()),
            "IMAGE_WORKERS" => Some("6".to_string()),
            "VIDEO_JOB_TIMEOUT_SECS" => Some("120".to_string()),
            "STALE_JOB_REAP_INTERVAL_SECS" => Some("0".to_string()),
            _ => None,
        })
        .unwrap();
        let config = JobQueueConfig::from_pipeline_config(&pipeline);
        assert_eq!(config.image.workers, 6);
        assert_eq!(config.video.timeout, Duration::from_secs(120));
        assert_eq!(config.video.workers, 1);
        assert!(config.stale_reap_interval.is_zero());
    }

    #[test]
    fn attempts_never_zero() {
        let policy = FamilyPolicy::for_family(JobFamily::Image).with_max_attempts(0);
        assert_eq!(policy.max_attempts, 1);
    }
}
