//! Video transcoding through ffmpeg/ffprobe
//!
//! - `command`: ffmpeg argument building from `VideoOperations`
//! - `progress`: `-progress pipe:2` parsing
//! - `media_info`: duration and resolution via ffprobe
//! - `transformer`: runs a transcode end to end

pub mod command;
pub mod media_info;
pub mod progress;
pub mod transformer;

pub use command::{resolve_container, FfmpegCommand};
pub use media_info::{inspect_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use transformer::{VideoTransformOutput, VideoTransformer};
