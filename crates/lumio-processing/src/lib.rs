//! Media transforms for the lumio pipeline: smart crop, image and video
//! variants, ZIP archives.

pub mod archive;
pub mod image;
pub mod output;
pub mod paths;
pub mod video;

pub use archive::{ArchiveEntry, ArchiveOutput};
pub use paths::StorageLayout;
