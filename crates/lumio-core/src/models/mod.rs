//! Data models for the media pipeline
//!
//! Jobs and their typed payloads, the read-only source media references,
//! the derived variants a successful job produces, and the crop rectangle
//! passed between the smart-crop engine and the image executor.

mod crop;
mod job;
mod media;
mod payload;

pub use crop::*;
pub use job::*;
pub use media::*;
pub use payload::*;
