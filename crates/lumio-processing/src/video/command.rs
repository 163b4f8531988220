//! FFmpeg command builder.

use std::path::{Path, PathBuf};

use lumio_core::models::{VideoContainer, VideoOperations};

/// CRF used when no quality tier is requested.
const DEFAULT_CRF_X264: u8 = 23;
const DEFAULT_CRF_VP9: u8 = 31;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments before -i
    input_args: Vec<String>,
    /// Arguments after -i
    output_args: Vec<String>,
    filters: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Append a filter to the `-vf` chain.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn video_bitrate_kbps(self, kbps: u32) -> Self {
        self.output_arg("-b:v").output_arg(format!("{}k", kbps))
    }

    pub fn audio_bitrate_kbps(self, kbps: u32) -> Self {
        self.output_arg("-b:a").output_arg(format!("{}k", kbps))
    }

    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Force the output muxer.
    pub fn muxer(self, name: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(name)
    }

    /// Command for `ops` writing `container` to `output`.
    pub fn for_operations(
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        ops: &VideoOperations,
        container: VideoContainer,
    ) -> Self {
        let mut cmd = Self::new(input, output);

        if let Some(trim) = &ops.trim {
            cmd = cmd.seek(trim.start).duration(trim.duration);
        }
        if let Some(crop) = &ops.crop {
            cmd = cmd.filter(format!(
                "crop={}:{}:{}:{}",
                crop.width, crop.height, crop.x, crop.y
            ));
        }
        if let Some(preset) = ops.resolution {
            let (w, h) = preset.dimensions();
            cmd = cmd.filter(format!(
                "scale=w={}:h={}:force_original_aspect_ratio=decrease:force_divisible_by=2",
                w, h
            ));
        }

        let (video_codec, audio_codec) = container.codecs();
        cmd = cmd.video_codec(video_codec);
        match ops.quality {
            Some(quality) => {
                let (video_kbps, audio_kbps) = quality.bitrates_kbps();
                cmd = cmd
                    .video_bitrate_kbps(video_kbps)
                    .audio_codec(audio_codec)
                    .audio_bitrate_kbps(audio_kbps);
            }
            None => {
                cmd = match container {
                    // VP9 constant-quality mode needs -b:v 0.
                    VideoContainer::Webm => cmd.crf(DEFAULT_CRF_VP9).output_arg("-b:v").output_arg("0"),
                    _ => cmd.crf(DEFAULT_CRF_X264),
                };
                cmd = cmd.audio_codec(audio_codec);
            }
        }

        if matches!(container, VideoContainer::Mp4 | VideoContainer::Mov) {
            cmd = cmd.output_arg("-movflags").output_arg("+faststart");
        }
        cmd.muxer(muxer_name(container))
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            // Progress key=value stream on stderr
            "-progress".to_string(),
            "pipe:2".to_string(),
            "-nostats".to_string(),
        ];

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        if !self.filters.is_empty() {
            args.push("-vf".to_string());
            args.push(self.filters.join(","));
        }
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

fn muxer_name(container: VideoContainer) -> &'static str {
    match container {
        VideoContainer::Mp4 => "mp4",
        VideoContainer::Webm => "webm",
        VideoContainer::Mov => "mov",
        VideoContainer::Mkv => "matroska",
    }
}

/// Requested container, else the source's if supported, else mp4.
pub fn resolve_container(requested: Option<VideoContainer>, source: &Path) -> VideoContainer {
    requested
        .or_else(|| {
            source
                .extension()
                .and_then(|e| e.to_str())
                .and_then(VideoContainer::from_extension)
        })
        .unwrap_or(VideoContainer::Mp4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumio_core::models::{ResolutionPreset, TrimOperation, VideoCropOperation, VideoQuality};

    fn position(args: &[String], value: &str) -> usize {
        args.iter().position(|a| a == value).unwrap()
    }

    #[test]
    fn test_command_builder() {
        let args = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .duration(30.0)
            .video_codec("libx264")
            .crf(18)
            .build_args();
        assert!(args.contains(&"10.000".to_string()));
        assert!(position(&args, "-ss") < position(&args, "-i"));
        assert!(position(&args, "-c:v") > position(&args, "-i"));
        assert_eq!(args.last().unwrap(), "output.mp4");
    }

    #[test]
    fn test_full_operation_set() {
        let ops = VideoOperations {
            format: Some(VideoContainer::Mp4),
            quality: Some(VideoQuality::Medium),
            resolution: Some(ResolutionPreset::P720),
            trim: Some(TrimOperation {
                start: 1.5,
                duration: 4.0,
            }),
            crop: Some(VideoCropOperation {
                width: 640,
                height: 360,
                x: 10,
                y: 20,
            }),
        };
        let args =
            FfmpegCommand::for_operations("in.mov", "out.mp4", &ops, VideoContainer::Mp4).build_args();

        let vf = &args[position(&args, "-vf") + 1];
        assert_eq!(
            vf,
            "crop=640:360:10:20,scale=w=1280:h=720:force_original_aspect_ratio=decrease:force_divisible_by=2"
        );
        assert_eq!(args[position(&args, "-b:v") + 1], "2500k");
        assert_eq!(args[position(&args, "-b:a") + 1], "128k");
        assert_eq!(args[position(&args, "-c:v") + 1], "libx264");
        assert_eq!(args[position(&args, "-c:a") + 1], "aac");
        assert_eq!(args[position(&args, "-f") + 1], "mp4");
        assert_eq!(args[position(&args, "-ss") + 1], "1.500");
        assert_eq!(args[position(&args, "-t") + 1], "4.000");
        assert!(args.contains(&"+faststart".to_string()));
    }

    #[test]
    fn test_webm_without_quality_uses_constant_quality() {
        let args = FfmpegCommand::for_operations(
            "in.mp4",
            "out.webm",
            &VideoOperations::default(),
            VideoContainer::Webm,
        )
        .build_args();
        assert_eq!(args[position(&args, "-c:v") + 1], "libvpx-vp9");
        assert_eq!(args[position(&args, "-c:a") + 1], "libopus");
        assert_eq!(args[position(&args, "-crf") + 1], "31");
        assert_eq!(args[position(&args, "-b:v") + 1], "0");
        assert!(!args.contains(&"-vf".to_string()));
        assert!(!args.contains(&"+faststart".to_string()));
    }

    #[test]
    fn test_mkv_muxer_name() {
        let args = FfmpegCommand::for_operations(
            "in.mp4",
            "out.mkv",
            &VideoOperations::default(),
            VideoContainer::Mkv,
        )
        .build_args();
        assert_eq!(args[position(&args, "-f") + 1], "matroska");
    }

    #[test]
    fn test_resolve_container() {
        assert_eq!(
            resolve_container(Some(VideoContainer::Webm), Path::new("a.mp4")),
            VideoContainer::Webm
        );
        assert_eq!(
            resolve_container(None, Path::new("a.MOV")),
            VideoContainer::Mov
        );
        assert_eq!(
            resolve_container(None, Path::new("a.avi")),
            VideoContainer::Mp4
        );
    }
}
