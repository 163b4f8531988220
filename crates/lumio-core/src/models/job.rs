use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ErrorKind, PipelineError, PipelineResult};

/// Kind of work a job performs. Each type belongs to exactly one [`JobFamily`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    ImageCrop,
    ImageResize,
    ImageSmartCrop,
    VideoProcess,
    ZipCreate,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::ImageCrop,
        JobType::ImageResize,
        JobType::ImageSmartCrop,
        JobType::VideoProcess,
        JobType::ZipCreate,
    ];

    pub fn family(&self) -> JobFamily {
        match self {
            JobType::ImageCrop | JobType::ImageResize | JobType::ImageSmartCrop => {
                JobFamily::Image
            }
            JobType::VideoProcess => JobFamily::Video,
            JobType::ZipCreate => JobFamily::Archive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ImageCrop => "IMAGE_CROP",
            JobType::ImageResize => "IMAGE_RESIZE",
            JobType::ImageSmartCrop => "IMAGE_SMART_CROP",
            JobType::VideoProcess => "VIDEO_PROCESS",
            JobType::ZipCreate => "ZIP_CREATE",
        }
    }
}

impl Display for JobType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IMAGE_CROP" => Ok(JobType::ImageCrop),
            "IMAGE_RESIZE" => Ok(JobType::ImageResize),
            "IMAGE_SMART_CROP" => Ok(JobType::ImageSmartCrop),
            "VIDEO_PROCESS" => Ok(JobType::VideoProcess),
            "ZIP_CREATE" => Ok(JobType::ZipCreate),
            _ => Err(anyhow::anyhow!("Invalid job type: {}", s)),
        }
    }
}

/// A class of jobs sharing an executor pool, a concurrency limit and a retry policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobFamily {
    Image,
    Video,
    Archive,
}

impl JobFamily {
    pub const ALL: [JobFamily; 3] = [JobFamily::Image, JobFamily::Video, JobFamily::Archive];

    /// Job types routed to this family's pool.
    pub fn job_types(&self) -> Vec<JobType> {
        JobType::ALL
            .into_iter()
            .filter(|t| t.family() == *self)
            .collect()
    }
}

impl Display for JobFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobFamily::Image => write!(f, "image"),
            JobFamily::Video => write!(f, "video"),
            JobFamily::Archive => write!(f, "archive"),
        }
    }
}

/// Persisted job state. Transitions only move forward:
/// `Pending -> Processing -> Completed | Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub owner_id: Uuid,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    /// Best-effort percent complete (0-100), only reported by long-running executors.
    pub progress: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a fresh PENDING job record.
    pub fn new(job_type: JobType, owner_id: Uuid, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type,
            status: JobStatus::Pending,
            owner_id,
            payload,
            result: None,
            error_kind: None,
            error: None,
            progress: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn family(&self) -> JobFamily {
        self.job_type.family()
    }

    /// Typed payload of this job. A payload naming a different owner than the
    /// job record is refused, so a job can only touch its own owner's media.
    pub fn try_payload_as<P: JobPayload>(&self) -> PipelineResult<P> {
        let payload: P = serde_json::from_value(self.payload.clone())?;
        if payload.owner_id() != self.owner_id {
            return Err(PipelineError::source_not_found(format!(
                "job {} is owned by {}, payload names {}",
                self.id,
                self.owner_id,
                payload.owner_id()
            )));
        }
        Ok(payload)
    }
}

/// Trait for type-safe job payloads
pub trait JobPayload: Serialize + for<'de> Deserialize<'de> {
    /// Owner the job runs on behalf of; every source lookup is checked against it.
    fn owner_id(&self) -> Uuid;
}

/// Error details exposed to pollers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobErrorView {
    pub kind: ErrorKind,
    pub message: String,
}

/// Response model for a job status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorView>,
}

impl From<Job> for JobStatusView {
    fn from(job: Job) -> Self {
        let error = match (job.error_kind, job.error) {
            (Some(kind), Some(message)) => Some(JobErrorView { kind, message }),
            (Some(kind), None) => Some(JobErrorView {
                kind,
                message: String::new(),
            }),
            _ => None,
        };
        Self {
            id: job.id,
            job_type: job.job_type,
            status: job.status,
            progress: job.progress,
            result: job.result,
            error,
        }
    }
}
