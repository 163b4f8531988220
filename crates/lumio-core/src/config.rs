//! Configuration module
//!
//! Environment-driven settings for the worker daemon: database, filesystem
//! layout, transcoder binaries and per-family pool limits.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DB_MAX_CONNECTIONS: u32 = 10;
const UPLOADS_ROOT: &str = "./uploads";
const VARIANTS_DIR: &str = "variants";
const ARCHIVES_DIR: &str = "archives";
const IMAGE_WORKERS: usize = 2;
const JOB_POLL_INTERVAL_MS: u64 = 500;
const IMAGE_JOB_TIMEOUT_SECS: u64 = 300;
const VIDEO_JOB_TIMEOUT_SECS: u64 = 3600;
const ARCHIVE_JOB_TIMEOUT_SECS: u64 = 900;
const STALE_JOB_REAP_INTERVAL_SECS: u64 = 60;
const STALE_JOB_GRACE_SECS: u64 = 7200;

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub uploads_root: PathBuf,
    /// Relative to `uploads_root`.
    pub variants_dir: String,
    /// Relative to `uploads_root`.
    pub archives_dir: String,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub image_workers: usize,
    pub poll_interval_ms: u64,
    pub image_timeout_secs: u64,
    pub video_timeout_secs: u64,
    pub archive_timeout_secs: u64,
    /// 0 disables the stale-job reaper.
    pub stale_reap_interval_secs: u64,
    pub stale_grace_secs: u64,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let parse_u64 = |key: &str, default: u64| -> Result<u64, anyhow::Error> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| anyhow::anyhow!("{} must be a non-negative integer: {}", key, e)),
                None => Ok(default),
            }
        };

        let config = PipelineConfig {
            database_url,
            db_max_connections: u32::try_from(parse_u64(
                "DB_MAX_CONNECTIONS",
                DB_MAX_CONNECTIONS as u64,
            )?)
            .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must fit in 32 bits"))?,
            uploads_root: PathBuf::from(
                lookup("UPLOADS_ROOT").unwrap_or_else(|| UPLOADS_ROOT.to_string()),
            ),
            variants_dir: lookup("VARIANTS_DIR").unwrap_or_else(|| VARIANTS_DIR.to_string()),
            archives_dir: lookup("ARCHIVES_DIR").unwrap_or_else(|| ARCHIVES_DIR.to_string()),
            ffmpeg_path: lookup("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_path: lookup("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".to_string()),
            image_workers: usize::try_from(parse_u64("IMAGE_WORKERS", IMAGE_WORKERS as u64)?)
                .map_err(|_| anyhow::anyhow!("IMAGE_WORKERS is out of range"))?,
            poll_interval_ms: parse_u64("JOB_POLL_INTERVAL_MS", JOB_POLL_INTERVAL_MS)?,
            image_timeout_secs: parse_u64("IMAGE_JOB_TIMEOUT_SECS", IMAGE_JOB_TIMEOUT_SECS)?,
            video_timeout_secs: parse_u64("VIDEO_JOB_TIMEOUT_SECS", VIDEO_JOB_TIMEOUT_SECS)?,
            archive_timeout_secs: parse_u64("ARCHIVE_JOB_TIMEOUT_SECS", ARCHIVE_JOB_TIMEOUT_SECS)?,
            stale_reap_interval_secs: parse_u64(
                "STALE_JOB_REAP_INTERVAL_SECS",
                STALE_JOB_REAP_INTERVAL_SECS,
            )?,
            stale_grace_secs: parse_u64("STALE_JOB_GRACE_SECS", STALE_JOB_GRACE_SECS)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.database_url.starts_with("postgres://")
            || self.database_url.starts_with("postgresql://"))
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.image_workers == 0 {
            return Err(anyhow::anyhow!("IMAGE_WORKERS must be at least 1"));
        }

        if self.image_timeout_secs == 0
            || self.video_timeout_secs == 0
            || self.archive_timeout_secs == 0
        {
            return Err(anyhow::anyhow!("Job timeouts must be greater than zero"));
        }

        for (key, path) in [
            ("FFMPEG_PATH", &self.ffmpeg_path),
            ("FFPROBE_PATH", &self.ffprobe_path),
        ] {
            if path.is_empty()
                || path
                    .chars()
                    .any(|c| matches!(c, ';' | '&' | '|' | '$' | '`' | '\n' | '<' | '>'))
            {
                return Err(anyhow::anyhow!("{} contains invalid characters", key));
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn variants_root(&self) -> PathBuf {
        self.uploads_root.join(&self.variants_dir)
    }

    pub fn archives_root(&self) -> PathBuf {
        self.uploads_root.join(&self.archives_dir)
    }
}
