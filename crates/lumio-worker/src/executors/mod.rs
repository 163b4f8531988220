//! Built-in executors, one per job family.

mod archive;
mod image;
mod video;

pub use archive::ArchiveExecutor;
pub use image::ImageExecutor;
pub use video::VideoExecutor;
