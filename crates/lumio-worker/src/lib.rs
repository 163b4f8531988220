//! Lumio worker
//!
//! Job submission, per-family worker pools and the executors that run image,
//! video and archive jobs.

pub mod context;
pub mod executor;
pub mod executors;
pub mod policy;
pub mod queue;
pub mod telemetry;

pub use context::PipelineContext;
pub use executor::{ExecutorRegistry, JobExecutor, ProgressSender};
pub use policy::{FamilyPolicy, JobQueueConfig};
pub use queue::JobQueue;
