//! Error types module
//!
//! `PipelineError` is the taxonomy every executor reports through. The worker
//! layer only looks at [`PipelineError::is_recoverable`] to decide whether to
//! retry, and at [`PipelineError::kind`] to persist a stable machine-readable
//! kind next to the free-text message.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io;
use std::str::FromStr;

/// Stable, machine-readable error kind stored on failed jobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceNotFound,
    Validation,
    Processing,
    Transcode,
    Archive,
    QueueUnavailable,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SourceNotFound => "source_not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Processing => "processing",
            ErrorKind::Transcode => "transcode",
            ErrorKind::Archive => "archive",
            ErrorKind::QueueUnavailable => "queue_unavailable",
            ErrorKind::Timeout => "timeout",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source_not_found" => Ok(ErrorKind::SourceNotFound),
            "validation" => Ok(ErrorKind::Validation),
            "processing" => Ok(ErrorKind::Processing),
            "transcode" => Ok(ErrorKind::Transcode),
            "archive" => Ok(ErrorKind::Archive),
            "queue_unavailable" => Ok(ErrorKind::QueueUnavailable),
            "timeout" => Ok(ErrorKind::Timeout),
            _ => Err(anyhow::anyhow!("Invalid error kind: {}", s)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Source row or backing file is missing, or owned by someone else.
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Invalid operation: {0}")]
    Validation(String),

    #[error("{operation} failed: {message}")]
    Processing { operation: String, message: String },

    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error("Archive failed: {0}")]
    Archive(String),

    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn source_not_found(msg: impl Into<String>) -> Self {
        PipelineError::SourceNotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        PipelineError::Validation(msg.into())
    }

    pub fn processing(operation: impl Into<String>, err: impl Display) -> Self {
        PipelineError::Processing {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        PipelineError::Transcode(msg.into())
    }

    pub fn archive(msg: impl Into<String>) -> Self {
        PipelineError::Archive(msg.into())
    }

    pub fn queue_unavailable(err: impl Display) -> Self {
        PipelineError::QueueUnavailable(err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::SourceNotFound(_) => ErrorKind::SourceNotFound,
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Processing { .. } => ErrorKind::Processing,
            PipelineError::Transcode(_) => ErrorKind::Transcode,
            PipelineError::Archive(_) => ErrorKind::Archive,
            PipelineError::QueueUnavailable(_) => ErrorKind::QueueUnavailable,
            PipelineError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Machine-readable error code (e.g., "SOURCE_NOT_FOUND")
    pub fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::SourceNotFound => "SOURCE_NOT_FOUND",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Processing => "PROCESSING_ERROR",
            ErrorKind::Transcode => "TRANSCODE_ERROR",
            ErrorKind::Archive => "ARCHIVE_ERROR",
            ErrorKind::QueueUnavailable => "QUEUE_UNAVAILABLE",
            ErrorKind::Timeout => "TIMEOUT",
        }
    }

    /// Whether the failed attempt may be retried under the family's policy.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::Processing { .. }
                | PipelineError::Transcode(_)
                | PipelineError::Archive(_)
        )
    }
}

impl From<io::Error> for PipelineError {
    fn from(err: io::Error) -> Self {
        PipelineError::processing("I/O", err)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Validation(format!("JSON parsing error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(PipelineError::processing("encode", "bad header").is_recoverable());
        assert!(PipelineError::transcode("exit 1").is_recoverable());
        assert!(PipelineError::archive("disk full").is_recoverable());

        assert!(!PipelineError::source_not_found("img").is_recoverable());
        assert!(!PipelineError::validation("negative width").is_recoverable());
        assert!(!PipelineError::queue_unavailable("db down").is_recoverable());
        assert!(!PipelineError::Timeout { seconds: 5 }.is_recoverable());
    }

    #[test]
    fn test_kind_strings_round_trip() {
        for kind in [
            ErrorKind::SourceNotFound,
            ErrorKind::Validation,
            ErrorKind::Processing,
            ErrorKind::Transcode,
            ErrorKind::Archive,
            ErrorKind::QueueUnavailable,
            ErrorKind::Timeout,
        ] {
            assert_eq!(kind.as_str().parse::<ErrorKind>().unwrap(), kind);
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[test]
    fn test_processing_message_carries_operation() {
        let err = PipelineError::processing("decode source", "unexpected EOF");
        assert_eq!(err.to_string(), "decode source failed: unexpected EOF");
        assert_eq!(err.error_code(), "PROCESSING_ERROR");
    }

    #[test]
    fn test_io_error_maps_to_processing() {
        let err: PipelineError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert_eq!(err.kind(), ErrorKind::Processing);
    }
}
