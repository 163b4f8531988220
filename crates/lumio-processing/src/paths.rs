use std::path::{Component, Path, PathBuf};

use lumio_core::{PipelineConfig, PipelineError, PipelineResult};

/// Filesystem layout under the uploads root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    uploads_root: PathBuf,
    variants_dir: PathBuf,
    archives_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(
        uploads_root: impl Into<PathBuf>,
        variants_dir: impl AsRef<Path>,
        archives_dir: impl AsRef<Path>,
    ) -> Self {
        let uploads_root = uploads_root.into();
        Self {
            variants_dir: uploads_root.join(variants_dir),
            archives_dir: uploads_root.join(archives_dir),
            uploads_root,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.uploads_root.clone(),
            &config.variants_dir,
            &config.archives_dir,
        )
    }

    pub fn uploads_root(&self) -> &Path {
        &self.uploads_root
    }

    pub fn variants_dir(&self) -> &Path {
        &self.variants_dir
    }

    pub fn archives_dir(&self) -> &Path {
        &self.archives_dir
    }

    /// Absolute location of a stored relative path. Absolute paths and `..`
    /// components never resolve.
    pub fn resolve_source(&self, relative: &str) -> PipelineResult<PathBuf> {
        let path = Path::new(relative);
        let escapes = relative.is_empty()
            || path.components().any(|c| {
                matches!(
                    c,
                    Component::ParentDir | Component::RootDir | Component::Prefix(_)
                )
            });
        if escapes {
            return Err(PipelineError::source_not_found(format!(
                "invalid stored path: {}",
                relative
            )));
        }
        Ok(self.uploads_root.join(path))
    }

    /// Path relative to the uploads root, as stored on derived variants.
    pub fn storage_path(&self, absolute: &Path) -> String {
        absolute
            .strip_prefix(&self.uploads_root)
            .unwrap_or(absolute)
            .to_string_lossy()
            .replace('\\', "/")
    }
}
