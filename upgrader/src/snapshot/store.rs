//! Append-only snapshot store

use std::path::{Path, PathBuf};

use tracing::info;

use crate::device::{ConnectionHandle, DeviceClient};
use crate::errors::UpgradeError;
use crate::filesys::file::File;
use crate::models::artifact::ArtifactRef;
use crate::models::device::validate_hostname;
use crate::models::snapshot::{Phase, Snapshot};
use crate::storage::layout::StorageLayout;
use crate::utils::file_timestamp;

/// A snapshot together with where it was persisted
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub snapshot: Snapshot,
    pub artifact: ArtifactRef,
}

/// Persists snapshots as one JSON file per (device, phase, timestamp)
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    layout: StorageLayout,
}

impl SnapshotStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Capture the device's current network state and persist it
    pub async fn take_snapshot(
        &self,
        client: &dyn DeviceClient,
        handle: &ConnectionHandle,
        hostname: &str,
        phase: Phase,
    ) -> Result<StoredSnapshot, UpgradeError> {
        info!("{}: Taking {} snapshot", hostname, phase);
        let state = client.collect_network_state(handle).await?;
        let snapshot = Snapshot::new(hostname, phase, state);
        let artifact = self.write(&snapshot).await?;
        info!("{}: Snapshot saved to {}", hostname, artifact.path.display());
        Ok(StoredSnapshot { snapshot, artifact })
    }

    /// Persist a snapshot. Never replaces an existing file.
    pub async fn write(&self, snapshot: &Snapshot) -> Result<ArtifactRef, UpgradeError> {
        validate_hostname(&snapshot.firewall)?;
        let contents = serde_json::to_vec_pretty(snapshot)?;
        self.layout
            .phase_dir(&snapshot.firewall, snapshot.phase)
            .create_unique_file(&file_timestamp(snapshot.timestamp), "json", &contents)
            .await
            .map_err(|e| UpgradeError::StorageError(format!("writing snapshot: {}", e)))
    }

    pub async fn load(&self, path: &Path) -> Result<Snapshot, UpgradeError> {
        File::new(path).read_json().await
    }

    /// Snapshot files for a device and phase, oldest first
    pub async fn list(&self, hostname: &str, phase: Phase) -> Result<Vec<PathBuf>, UpgradeError> {
        validate_hostname(hostname)?;
        let files = self.layout.phase_dir(hostname, phase).list_files().await?;
        Ok(files
            .into_iter()
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect())
    }

    /// Newest snapshot by timestamp; among equal timestamps the last written wins
    pub async fn latest(&self, hostname: &str, phase: Phase) -> Result<Option<Snapshot>, UpgradeError> {
        let mut newest: Option<Snapshot> = None;
        for path in self.list(hostname, phase).await? {
            let snapshot = self.load(&path).await?;
            if newest.as_ref().map_or(true, |n| snapshot.timestamp >= n.timestamp) {
                newest = Some(snapshot);
            }
        }
        Ok(newest)
    }
}
