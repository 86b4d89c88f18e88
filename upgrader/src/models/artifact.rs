//! Artifact references

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A file produced by the tool (config backup, snapshot, rendered report)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Location of the artifact on disk
    pub path: PathBuf,

    /// SHA-256 digest of the written bytes, hex encoded
    pub sha256: String,
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (sha256 {})", self.path.display(), &self.sha256[..12.min(self.sha256.len())])
    }
}
