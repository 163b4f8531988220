use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;

use lumio_core::models::{VideoContainer, VideoOperations};
use lumio_core::{PipelineError, PipelineResult};

use super::command::{resolve_container, FfmpegCommand};
use super::media_info::{inspect_video, VideoInfo};
use super::progress::{is_progress_line, parse_progress_line, FfmpegProgress};
use crate::output;

/// Lines of ffmpeg diagnostics kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTransformOutput {
    pub output_path: PathBuf,
    pub duration_seconds: f64,
    /// `WIDTHxHEIGHT`
    pub resolution: String,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub mime_type: String,
    pub format: VideoContainer,
}

/// Runs ffmpeg transcodes for VIDEO_PROCESS jobs.
#[derive(Debug, Clone)]
pub struct VideoTransformer {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl VideoTransformer {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Transcode `source` into a new file under `output_dir`. Percent progress
    /// is published on `progress` when given. The child process is killed if
    /// this future is dropped.
    #[tracing::instrument(skip(self, ops, progress), fields(source = %source.display()))]
    pub async fn execute(
        &self,
        source: &Path,
        ops: &VideoOperations,
        output_dir: &Path,
        progress: Option<watch::Sender<u8>>,
    ) -> PipelineResult<VideoTransformOutput> {
        ops.validate()?;

        match tokio::fs::metadata(source).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(PipelineError::source_not_found(format!(
                    "source is not a file: {}",
                    source.display()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::source_not_found(format!(
                    "source file missing: {}",
                    source.display()
                )))
            }
            Err(e) => return Err(PipelineError::processing("stat source", e)),
        }

        let source_info = inspect_video(&self.ffprobe_path, source).await?;
        check_crop_bounds(ops, &source_info)?;
        let expected_seconds = expected_duration(ops, source_info.duration);

        let container = resolve_container(ops.format, source);
        let temp_path = output::temp_file_in(output_dir, container.extension())
            .map_err(|e| PipelineError::processing("create output file", e))?
            .into_temp_path();

        let args = FfmpegCommand::for_operations(source, &temp_path, ops, container).build_args();
        tracing::debug!("Running FFmpeg: {} {}", self.ffmpeg_path, args.join(" "));

        self.run(&args, expected_seconds, progress.as_ref()).await?;

        let info = inspect_video(&self.ffprobe_path, &temp_path).await?;
        let byte_size = tokio::fs::metadata(&temp_path)
            .await
            .map_err(|e| PipelineError::processing("stat output", e))?
            .len();

        let source_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let file_name = output::variant_file_name(source_name, "video", container.extension());
        let output_path = output::persist_path(temp_path, output_dir, &file_name)
            .map_err(|e| PipelineError::processing("write output", e))?;

        if let Some(tx) = &progress {
            publish(tx, 100);
        }

        tracing::info!(
            output = %output_path.display(),
            duration = info.duration,
            resolution = %info.resolution(),
            byte_size,
            "Video variant written"
        );

        Ok(VideoTransformOutput {
            output_path,
            duration_seconds: info.duration,
            resolution: info.resolution(),
            width: info.width,
            height: info.height,
            byte_size,
            mime_type: container.mime_type().to_string(),
            format: container,
        })
    }

    async fn run(
        &self,
        args: &[String],
        expected_seconds: f64,
        progress: Option<&watch::Sender<u8>>,
    ) -> PipelineResult<()> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PipelineError::transcode(format!("failed to start {}: {}", self.ffmpeg_path, e))
            })?;

        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        if let Some(stderr) = child.stderr.take() {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            let mut current = FfmpegProgress::default();
            while let Some(line) = next_lossy_line(&mut reader, &mut buf).await {
                if is_progress_line(&line) {
                    if let Some(snapshot) = parse_progress_line(&line, &mut current) {
                        tracing::trace!(
                            frame = snapshot.frame,
                            speed = snapshot.speed,
                            out_time_us = snapshot.out_time_us,
                            "FFmpeg progress"
                        );
                        if let Some(tx) = progress {
                            // 100 is reserved for the persisted output.
                            publish(tx, snapshot.percentage(expected_seconds).min(99));
                        }
                    }
                    continue;
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| PipelineError::transcode(format!("ffmpeg did not exit cleanly: {}", e)))?;

        if status.success() {
            Ok(())
        } else {
            let stderr = tail.into_iter().collect::<Vec<_>>().join("\n");
            tracing::warn!(code = ?status.code(), stderr = %stderr, "FFmpeg failed");
            Err(PipelineError::transcode(format!(
                "ffmpeg exited with {}: {}",
                status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr
            )))
        }
    }
}

/// Next stderr line with invalid UTF-8 replaced. `None` at end of stream or on
/// a read error.
async fn next_lossy_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> Option<String> {
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) | Err(_) => None,
        Ok(_) => {
            let line = String::from_utf8_lossy(buf);
            Some(line.trim_end_matches(['\n', '\r']).to_string())
        }
    }
}

/// Progress only moves forward.
fn publish(tx: &watch::Sender<u8>, percent: u8) {
    tx.send_if_modified(|current| {
        if percent > *current {
            *current = percent;
            true
        } else {
            false
        }
    });
}

/// Seconds of output ffmpeg is expected to write.
fn expected_duration(ops: &VideoOperations, source_seconds: f64) -> f64 {
    match &ops.trim {
        Some(trim) if source_seconds > 0.0 => trim.duration.min((source_seconds - trim.start).max(0.0)),
        Some(trim) => trim.duration,
        None => source_seconds,
    }
}

fn check_crop_bounds(ops: &VideoOperations, info: &VideoInfo) -> PipelineResult<()> {
    let Some(crop) = &ops.crop else {
        return Ok(());
    };
    if info.width == 0 || info.height == 0 {
        return Ok(());
    }
    let fits = crop.x as u64 + crop.width as u64 <= info.width as u64
        && crop.y as u64 + crop.height as u64 <= info.height as u64;
    if fits {
        Ok(())
    } else {
        Err(PipelineError::validation(format!(
            "crop {}x{}+{}+{} is outside video frame {}",
            crop.width,
            crop.height,
            crop.x,
            crop.y,
            info.resolution()
        )))
    }
}
