//! Output file naming and atomic writes
//!
//! Every derived file gets a fresh name, `{stem}_{variant}_{unix-ms}_{8 hex}.{ext}`,
//! so concurrent workers never collide. Bytes go to a temp file in the target
//! directory first and are renamed into place only once fully written.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::{NamedTempFile, TempPath};
use uuid::Uuid;

const MAX_STEM_LEN: usize = 64;
const FALLBACK_STEM: &str = "file";

/// Filesystem-safe stem of a user-supplied name.
pub fn safe_stem(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        cleaned.to_string()
    }
}

pub fn variant_file_name(source_name: &str, variant: &str, extension: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{}.{}",
        safe_stem(source_name),
        variant,
        Utc::now().timestamp_millis(),
        &suffix[..8],
        extension
    )
}

/// Temp file in `dir`, created along with `dir` if needed.
pub fn temp_file_in(dir: &Path, extension: &str) -> io::Result<NamedTempFile> {
    fs::create_dir_all(dir)?;
    tempfile::Builder::new()
        .prefix(".lumio-")
        .suffix(&format!(".{}", extension))
        .tempfile_in(dir)
}

/// Rename a finished temp file to `dir/file_name`.
pub fn persist(temp: NamedTempFile, dir: &Path, file_name: &str) -> io::Result<PathBuf> {
    let target = dir.join(file_name);
    temp.persist(&target).map_err(|e| e.error)?;
    Ok(target)
}

/// Rename a finished temp path (written by an external process).
pub fn persist_path(temp: TempPath, dir: &Path, file_name: &str) -> io::Result<PathBuf> {
    let target = dir.join(file_name);
    temp.persist(&target).map_err(|e| e.error)?;
    Ok(target)
}

/// Write `data` to `dir/file_name` via temp file and rename.
pub fn write_atomic(dir: &Path, file_name: &str, data: &[u8]) -> io::Result<PathBuf> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("tmp");
    let mut temp = temp_file_in(dir, extension)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    persist(temp, dir, file_name)
}
