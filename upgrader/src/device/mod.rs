//! Device control
//!
//! [`DeviceClient`] is the capability interface the orchestrator drives. One
//! client serves one device; [`DeviceClientFactory`] builds them for a fleet.

pub mod poll;
pub mod remote;
pub mod simulated;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::UpgradeError;
use crate::models::artifact::ArtifactRef;
use crate::models::device::Device;
use crate::models::snapshot::NetworkState;

/// An authenticated session with a device
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub hostname: String,
    pub session_id: String,
    pub token: Option<Arc<SecretString>>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(hostname: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            session_id: session_id.into(),
            token: None,
            connected_at: Utc::now(),
        }
    }
}

/// Outcome of the pre-flight readiness checks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessResult {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    #[serde(default)]
    pub details: String,
}

impl ReadinessResult {
    /// A device is safe to upgrade only when no check failed
    pub fn is_ready(&self) -> bool {
        self.failed == 0
    }
}

/// Operations the upgrade needs from a single firewall
#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn connect(&self) -> Result<ConnectionHandle, UpgradeError>;

    async fn get_version(&self, handle: &ConnectionHandle) -> Result<String, UpgradeError>;

    async fn backup_config(&self, handle: &ConnectionHandle) -> Result<ArtifactRef, UpgradeError>;

    async fn readiness_check(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<ReadinessResult, UpgradeError>;

    /// Fails with `DownloadError` on checksum or disk space problems
    async fn download_image(
        &self,
        handle: &ConnectionHandle,
        version: &str,
    ) -> Result<(), UpgradeError>;

    async fn install_image(
        &self,
        handle: &ConnectionHandle,
        version: &str,
    ) -> Result<(), UpgradeError>;

    async fn reboot(&self, handle: &ConnectionHandle) -> Result<(), UpgradeError>;

    /// Fails with `PostRebootTimeoutError` if the device is not back within
    /// `timeout`
    async fn wait_for_ready(
        &self,
        handle: &ConnectionHandle,
        timeout: Duration,
    ) -> Result<(), UpgradeError>;

    async fn collect_network_state(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<NetworkState, UpgradeError>;
}

/// Builds a client for each device of a fleet
pub trait DeviceClientFactory: Send + Sync {
    fn client_for(&self, device: &Device) -> Result<Box<dyn DeviceClient>, UpgradeError>;
}
