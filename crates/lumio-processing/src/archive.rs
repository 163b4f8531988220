//! ZIP archive building for ZIP_CREATE jobs

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use lumio_core::{PipelineError, PipelineResult};

use crate::output;

const METADATA_ENTRY: &str = "metadata.json";

/// One file to place in the archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    /// Requested entry name; sanitised before use.
    pub name: String,
    /// Extra fields listed for this entry in `metadata.json`.
    pub metadata: serde_json::Value,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveOutput {
    pub archive_path: PathBuf,
    pub byte_size: u64,
    pub included_count: usize,
    /// Entry names that could not be read.
    pub skipped: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataFile<'a> {
    archive_name: &'a str,
    created_at: String,
    files: Vec<serde_json::Value>,
}

/// Sanitize filename for archive entry to prevent path traversal.
/// Extracts only the base name (strips path components like `../`).
fn sanitize_archive_filename(filename: &str, fallback: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or(fallback)
        .to_string()
}

/// `name`, or `stem (n).ext` for the first free n.
fn unique_entry_name(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let path = Path::new(&name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&name)
        .to_string();
    let ext = path.extension().and_then(|e| e.to_str()).map(str::to_string);
    let mut n = 1;
    loop {
        let candidate = match &ext {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Stream `entries` into a new ZIP under `archive_dir`. Unreadable files are
/// skipped; zero readable files fails with no archive left behind.
pub fn build(
    entries: &[ArchiveEntry],
    archive_dir: &Path,
    archive_name: &str,
    include_metadata: bool,
) -> PipelineResult<ArchiveOutput> {
    let temp = output::temp_file_in(archive_dir, "zip")
        .map_err(|e| PipelineError::archive(format!("cannot create archive file: {}", e)))?;

    let mut zip = ZipWriter::new(temp);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9))
        .unix_permissions(0o644);

    let mut used = HashSet::new();
    if include_metadata {
        used.insert(METADATA_ENTRY.to_string());
    }
    let mut skipped = Vec::new();
    let mut listed = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        // Read fully before starting the entry so a bad source never leaves
        // a half-written record in the archive.
        let bytes = match fs::read(&entry.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    path = %entry.path.display(),
                    error = %e,
                    "Skipping unreadable archive entry"
                );
                skipped.push(entry.name.clone());
                continue;
            }
        };

        let safe_name = sanitize_archive_filename(&entry.name, &format!("unnamed_{}", index));
        let entry_name = unique_entry_name(safe_name, &mut used);

        zip.start_file(entry_name.as_str(), options)
            .map_err(|e| PipelineError::archive(format!("failed to add {}: {}", entry_name, e)))?;
        zip.write_all(&bytes).map_err(|e| {
            PipelineError::archive(format!("failed to write {}: {}", entry_name, e))
        })?;
        let byte_size = bytes.len();

        let mut listing = serde_json::json!({
            "name": entry_name,
            "byteSize": byte_size,
        });
        if let (Some(obj), serde_json::Value::Object(extra)) =
            (listing.as_object_mut(), &entry.metadata)
        {
            for (k, v) in extra {
                obj.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        listed.push(listing);
    }

    if listed.is_empty() {
        // Dropping the writer removes the temp file.
        return Err(PipelineError::archive(format!(
            "none of the {} requested files could be read",
            entries.len()
        )));
    }
    let included_count = listed.len();

    if include_metadata {
        let metadata = MetadataFile {
            archive_name,
            created_at: Utc::now().to_rfc3339(),
            files: listed,
        };
        let body = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| PipelineError::archive(format!("failed to encode metadata: {}", e)))?;
        zip.start_file(METADATA_ENTRY, options)
            .and_then(|_| zip.write_all(&body).map_err(Into::into))
            .map_err(|e| PipelineError::archive(format!("failed to write metadata: {}", e)))?;
    }

    let temp = zip
        .finish()
        .map_err(|e| PipelineError::archive(format!("failed to finalize archive: {}", e)))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| PipelineError::archive(format!("failed to flush archive: {}", e)))?;

    let file_name = output::variant_file_name(archive_name, "zip", "zip");
    let archive_path = output::persist(temp, archive_dir, &file_name)
        .map_err(|e| PipelineError::archive(format!("failed to store archive: {}", e)))?;
    let byte_size = fs::metadata(&archive_path)
        .map_err(|e| PipelineError::archive(format!("failed to stat archive: {}", e)))?
        .len();

    tracing::info!(
        archive = %archive_path.display(),
        included_count,
        skipped = skipped.len(),
        byte_size,
        "Archive written"
    );

    Ok(ArchiveOutput {
        archive_path,
        byte_size,
        included_count,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Read;
    use zip::ZipArchive;

    fn entry_names(path: &Path) -> Vec<String> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_sanitize_archive_filename() {
        assert_eq!(sanitize_archive_filename("../../etc/passwd", "fallback"), "passwd");
        assert_eq!(sanitize_archive_filename("image.png", "fallback"), "image.png");
        assert_eq!(sanitize_archive_filename("", "fallback"), "fallback");
        assert_eq!(sanitize_archive_filename("..", "fallback"), "fallback");
    }

    #[test]
    fn test_unique_entry_name() {
        let mut used = HashSet::new();
        assert_eq!(unique_entry_name("a.jpg".into(), &mut used), "a.jpg");
        assert_eq!(unique_entry_name("a.jpg".into(), &mut used), "a (1).jpg");
        assert_eq!(unique_entry_name("a.jpg".into(), &mut used), "a (2).jpg");
        assert_eq!(unique_entry_name("README".into(), &mut used), "README");
        assert_eq!(unique_entry_name("README".into(), &mut used), "README (1)");
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        std::fs::write(&a, b"jpeg bytes").unwrap();
        let entries = vec![
            ArchiveEntry::new(&a, "a.jpg"),
            ArchiveEntry::new(dir.path().join("b.jpg"), "b.jpg"),
        ];
        let out_dir = dir.path().join("archives");

        let out = build(&entries, &out_dir, "export.zip", false).unwrap();
        assert_eq!(out.included_count, 1);
        assert_eq!(out.skipped, vec!["b.jpg".to_string()]);
        assert!(out.archive_path.exists());
        assert_eq!(
            out.byte_size,
            std::fs::metadata(&out.archive_path).unwrap().len()
        );
        assert_eq!(entry_names(&out.archive_path), vec!["a.jpg"]);

        let mut archive = ZipArchive::new(File::open(&out.archive_path).unwrap()).unwrap();
        let mut contents = Vec::new();
        archive
            .by_name("a.jpg")
            .unwrap()
            .read_to_end(&mut contents)
            .unwrap();
        assert_eq!(contents, b"jpeg bytes");
    }

    #[test]
    fn test_directory_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        std::fs::write(&a, b"jpeg bytes").unwrap();
        let b = dir.path().join("b.jpg");
        std::fs::create_dir(&b).unwrap();
        let entries = vec![ArchiveEntry::new(&a, "a.jpg"), ArchiveEntry::new(&b, "b.jpg")];

        let out = build(&entries, &dir.path().join("archives"), "export.zip", false).unwrap();
        assert_eq!(out.included_count, 1);
        assert_eq!(out.skipped, vec!["b.jpg".to_string()]);
        assert_eq!(entry_names(&out.archive_path), vec!["a.jpg"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_permission_denied_source_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let locked = dir.path().join("locked.jpg");
        std::fs::write(&a, b"1").unwrap();
        std::fs::write(&locked, b"2").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        if std::fs::read(&locked).is_ok() {
            // Running as root; permissions are not enforced.
            return;
        }
        let entries = vec![
            ArchiveEntry::new(&a, "a.jpg"),
            ArchiveEntry::new(&locked, "locked.jpg"),
        ];

        let out = build(&entries, &dir.path().join("archives"), "export.zip", false).unwrap();
        assert_eq!(out.included_count, 1);
        assert_eq!(out.skipped, vec!["locked.jpg".to_string()]);
    }

    #[test]
    fn test_all_missing_fails_without_archive() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("archives");
        let entries = vec![ArchiveEntry::new(dir.path().join("gone.jpg"), "gone.jpg")];
        let err = build(&entries, &out_dir, "export.zip", false).unwrap_err();
        assert_eq!(err.kind(), lumio_core::ErrorKind::Archive);
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_duplicate_names_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("one.jpg");
        let second = dir.path().join("two.jpg");
        std::fs::write(&first, b"1").unwrap();
        std::fs::write(&second, b"22").unwrap();
        let entries = vec![
            ArchiveEntry::new(&first, "photo.jpg")
                .with_metadata(serde_json::json!({ "imageId": "x" })),
            ArchiveEntry::new(&second, "../photo.jpg"),
        ];

        let out = build(&entries, dir.path(), "My Export", true).unwrap();
        assert_eq!(out.included_count, 2);
        assert_eq!(
            entry_names(&out.archive_path),
            vec!["photo.jpg", "photo (1).jpg", "metadata.json"]
        );
        let file_name = out.archive_path.file_name().unwrap().to_str().unwrap();
        assert!(file_name.starts_with("My_Export_zip_"));

        let mut archive = ZipArchive::new(File::open(&out.archive_path).unwrap()).unwrap();
        let mut body = String::new();
        archive
            .by_name("metadata.json")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        let metadata: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(metadata["archiveName"], "My Export");
        assert_eq!(metadata["files"][0]["imageId"], "x");
        assert_eq!(metadata["files"][1]["name"], "photo (1).jpg");
        assert_eq!(metadata["files"][1]["byteSize"], 2);
    }
}
