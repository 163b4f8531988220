//! FFmpeg progress parsing.

/// Progress snapshot from ffmpeg's `-progress` key=value stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    pub frame: u64,
    /// Output position in microseconds.
    pub out_time_us: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Percent complete against `total_seconds`, 0-100.
    pub fn percentage(&self, total_seconds: f64) -> u8 {
        if self.is_complete {
            return 100;
        }
        if !(total_seconds.is_finite() && total_seconds > 0.0) || self.out_time_us <= 0 {
            return 0;
        }
        let pct = self.out_time_us as f64 / (total_seconds * 1_000_000.0) * 100.0;
        pct.clamp(0.0, 100.0).floor() as u8
    }
}

/// `HH:MM:SS.micro` to microseconds.
fn parse_clock(value: &str) -> Option<i64> {
    let mut parts = value.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(((hours * 3600.0 + minutes * 60.0 + seconds) * 1_000_000.0).round() as i64)
}

/// Fold one `-progress` line into `current`. Returns a snapshot at the end of
/// each block (`progress=continue|end`).
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // ffmpeg reports out_time_ms in microseconds as well.
        "out_time_us" | "out_time_ms" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_us = us;
            }
        }
        "out_time" => {
            if let Some(us) = parse_clock(value) {
                current.out_time_us = us;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }
    None
}

/// Whether a stderr line belongs to the `-progress` stream rather than a log message.
pub fn is_progress_line(line: &str) -> bool {
    match line.split_once('=') {
        Some((key, _)) => {
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_block() {
        let mut progress = FfmpegProgress::default();
        for line in ["frame=120", "out_time_us=5000000", "speed=1.5x"] {
            assert!(parse_progress_line(line, &mut progress).is_none());
        }
        let snapshot = parse_progress_line("progress=continue", &mut progress).unwrap();
        assert_eq!(snapshot.frame, 120);
        assert_eq!(snapshot.out_time_us, 5_000_000);
        assert!((snapshot.speed - 1.5).abs() < 0.01);
        assert!(!snapshot.is_complete);
        assert_eq!(snapshot.percentage(10.0), 50);

        let done = parse_progress_line("progress=end", &mut progress).unwrap();
        assert!(done.is_complete);
        assert_eq!(done.percentage(10.0), 100);
    }

    #[test]
    fn test_out_time_ms_is_microseconds() {
        let mut progress = FfmpegProgress::default();
        parse_progress_line("out_time_ms=2500000", &mut progress);
        assert_eq!(progress.out_time_us, 2_500_000);
    }

    #[test]
    fn test_clock_form() {
        let mut progress = FfmpegProgress::default();
        parse_progress_line("out_time=00:01:02.500000", &mut progress);
        assert_eq!(progress.out_time_us, 62_500_000);
        parse_progress_line("out_time=N/A", &mut progress);
        assert_eq!(progress.out_time_us, 62_500_000);
    }

    #[test]
    fn test_percentage_bounds() {
        let progress = FfmpegProgress {
            out_time_us: 20_000_000,
            ..Default::default()
        };
        assert_eq!(progress.percentage(10.0), 100);
        assert_eq!(progress.percentage(0.0), 0);
        assert_eq!(progress.percentage(f64::NAN), 0);
        assert_eq!(FfmpegProgress::default().percentage(10.0), 0);
    }

    #[test]
    fn test_speed_not_available() {
        let mut progress = FfmpegProgress::default();
        parse_progress_line("speed=N/A", &mut progress);
        assert_eq!(progress.speed, 0.0);
    }

    #[test]
    fn test_is_progress_line() {
        assert!(is_progress_line("out_time_us=1"));
        assert!(is_progress_line("progress=end"));
        assert!(!is_progress_line("Error opening input file in.mp4."));
        assert!(!is_progress_line("[libx264 @ 0x1] crf=23.0 qcomp=0.60"));
    }
}
