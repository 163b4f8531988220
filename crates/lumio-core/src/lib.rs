//! Lumio Core Library
//!
//! Domain models, the pipeline error taxonomy and environment configuration
//! shared by the job store, the media processors and the worker pools.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError, PipelineResult};
