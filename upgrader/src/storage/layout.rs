//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::models::snapshot::Phase;

/// On-disk layout of assurance artifacts
///
/// ```text
/// <base>/snapshots/<host>/<pre|post>/<timestamp>.json
/// <base>/snapshots/<host>/diff/<timestamp>_report.<ext>
/// <base>/backups/<host>/<timestamp>.xml
/// <base>/logs/
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn snapshots_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("snapshots"))
    }

    /// Per-device snapshot tree
    pub fn device_snapshots_dir(&self, hostname: &str) -> Dir {
        self.snapshots_dir().subdir(hostname)
    }

    pub fn phase_dir(&self, hostname: &str, phase: Phase) -> Dir {
        self.device_snapshots_dir(hostname).subdir(phase.as_str())
    }

    pub fn diff_dir(&self, hostname: &str) -> Dir {
        self.device_snapshots_dir(hostname).subdir("diff")
    }

    pub fn backups_dir(&self, hostname: &str) -> Dir {
        Dir::new(self.base_dir.join("backups").join(hostname))
    }

    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("assurance")
    }
}
