//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::UpgradeError;
use crate::filesys::file::File;
use crate::models::artifact::ArtifactRef;

const MAX_NAME_SUFFIX: u32 = 1000;

/// A directory wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), UpgradeError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// List files in the directory in creation order of
    /// `create_unique_file` names: by stem, then by numeric `-<n>` suffix.
    ///
    /// A missing directory yields an empty list.
    pub async fn list_files(&self) -> Result<Vec<PathBuf>, UpgradeError> {
        if !self.exists().await {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }

        files.sort_by_cached_key(|path| unique_name_key(path));
        Ok(files)
    }

    /// Write `contents` to a new file named `<stem>.<ext>`, or
    /// `<stem>-<n>.<ext>` if that name is taken. Existing files are never
    /// replaced.
    pub async fn create_unique_file(
        &self,
        stem: &str,
        ext: &str,
        contents: &[u8],
    ) -> Result<ArtifactRef, UpgradeError> {
        for n in 0..MAX_NAME_SUFFIX {
            let name = if n == 0 {
                format!("{}.{}", stem, ext)
            } else {
                format!("{}-{}.{}", stem, n, ext)
            };
            match self.file(&name).create_new(contents).await {
                Ok(artifact) => return Ok(artifact),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(UpgradeError::StorageError(format!(
            "no free file name for {} in {}",
            stem,
            self.path.display()
        )))
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }
}

/// Split `<stem>-<n>.<ext>` into `(stem, n, ext)`; a bare `<stem>.<ext>` is `n = 0`
fn unique_name_key(path: &Path) -> (String, u32, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Some((base, n)) = stem.rsplit_once('-') {
        if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = n.parse() {
                return (base.to_string(), n, ext);
            }
        }
    }
    (stem, 0, ext)
}
