//! Device client backed by a device-control service
//!
//! Every operation is one JSON request against
//! `<controller>/devices/<hostname>/...`. Transport failures and server
//! errors are connectivity errors; a 4xx rejection becomes the failing
//! operation's own error class.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::device::poll::poll_until_ready;
use crate::device::{ConnectionHandle, DeviceClient, DeviceClientFactory, ReadinessResult};
use crate::errors::UpgradeError;
use crate::http::client::{ApiError, HttpClient};
use crate::models::artifact::ArtifactRef;
use crate::models::device::Device;
use crate::models::snapshot::NetworkState;
use crate::storage::layout::StorageLayout;
use crate::utils::file_timestamp;

#[derive(Serialize)]
struct SessionRequest<'a> {
    address: &'a str,
    username: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    via: Option<&'a str>,
}

#[derive(Deserialize)]
struct SessionResponse {
    session_id: String,
    token: String,
}

#[derive(Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Deserialize)]
struct ConfigExport {
    config: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    ready: bool,
}

#[derive(Deserialize)]
struct Ack {}

#[derive(Serialize)]
struct Empty {}

/// Map an API failure onto the error class of the operation
fn op_error(err: ApiError, wrap: fn(String) -> UpgradeError) -> UpgradeError {
    if err.is_rejection() {
        wrap(err.message())
    } else {
        err.into()
    }
}

/// A device reached through the device-control service
pub struct RemoteDeviceClient {
    http: Arc<HttpClient>,
    device: Device,
    layout: StorageLayout,
    poll_interval: Duration,
}

impl RemoteDeviceClient {
    pub fn new(
        http: Arc<HttpClient>,
        device: Device,
        layout: StorageLayout,
        poll_interval: Duration,
    ) -> Self {
        Self {
            http,
            device,
            layout,
            poll_interval,
        }
    }

    fn path<'a>(&'a self, rest: &[&'a str]) -> Vec<&'a str> {
        let mut segments = vec!["devices", self.device.hostname.as_str()];
        segments.extend_from_slice(rest);
        segments
    }

    fn token(handle: &ConnectionHandle) -> Option<&str> {
        handle.token.as_deref().map(|t| t.expose_secret())
    }
}

#[async_trait]
impl DeviceClient for RemoteDeviceClient {
    async fn connect(&self) -> Result<ConnectionHandle, UpgradeError> {
        let request = SessionRequest {
            address: &self.device.address,
            username: &self.device.credentials.username,
            password: self.device.credentials.password.expose_secret(),
            via: self.device.via.as_deref(),
        };
        let session: SessionResponse = self
            .http
            .post(&self.path(&["session"]), None, &request)
            .await
            .map_err(|e| op_error(e, UpgradeError::ConnectivityError))?;

        info!("{}: Session established", self.device.hostname);
        let mut handle = ConnectionHandle::new(&self.device.hostname, session.session_id);
        handle.token = Some(Arc::new(SecretString::from(session.token)));
        Ok(handle)
    }

    async fn get_version(&self, handle: &ConnectionHandle) -> Result<String, UpgradeError> {
        let response: VersionResponse = self
            .http
            .get(&self.path(&["version"]), Self::token(handle))
            .await?;
        Ok(response.version)
    }

    async fn backup_config(&self, handle: &ConnectionHandle) -> Result<ArtifactRef, UpgradeError> {
        let export: ConfigExport = self
            .http
            .post(&self.path(&["config", "export"]), Self::token(handle), &Empty {})
            .await
            .map_err(|e| op_error(e, UpgradeError::BackupError))?;

        self.layout
            .backups_dir(&self.device.hostname)
            .create_unique_file(
                &file_timestamp(chrono::Utc::now()),
                "xml",
                export.config.as_bytes(),
            )
            .await
            .map_err(|e| UpgradeError::BackupError(e.to_string()))
    }

    async fn readiness_check(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<ReadinessResult, UpgradeError> {
        Ok(self
            .http
            .get(&self.path(&["readiness"]), Self::token(handle))
            .await?)
    }

    async fn download_image(
        &self,
        handle: &ConnectionHandle,
        version: &str,
    ) -> Result<(), UpgradeError> {
        let _: Ack = self
            .http
            .post(
                &self.path(&["software", version, "download"]),
                Self::token(handle),
                &Empty {},
            )
            .await
            .map_err(|e| op_error(e, UpgradeError::DownloadError))?;
        Ok(())
    }

    async fn install_image(
        &self,
        handle: &ConnectionHandle,
        version: &str,
    ) -> Result<(), UpgradeError> {
        let _: Ack = self
            .http
            .post(
                &self.path(&["software", version, "install"]),
                Self::token(handle),
                &Empty {},
            )
            .await
            .map_err(|e| op_error(e, UpgradeError::InstallError))?;
        Ok(())
    }

    async fn reboot(&self, handle: &ConnectionHandle) -> Result<(), UpgradeError> {
        let _: Ack = self
            .http
            .post(&self.path(&["reboot"]), Self::token(handle), &Empty {})
            .await?;
        Ok(())
    }

    async fn wait_for_ready(
        &self,
        handle: &ConnectionHandle,
        timeout: Duration,
    ) -> Result<(), UpgradeError> {
        let path = self.path(&["status"]);
        let path = path.as_slice();
        let token = Self::token(handle);
        let http = self.http.as_ref();
        poll_until_ready(
            || async move {
                let status: StatusResponse = http.get(path, token).await?;
                Ok::<_, UpgradeError>(status.ready)
            },
            timeout,
            self.poll_interval,
        )
        .await
    }

    async fn collect_network_state(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<NetworkState, UpgradeError> {
        self.http
            .get(&self.path(&["network-state"]), Self::token(handle))
            .await
            .map_err(|e| op_error(e, UpgradeError::SnapshotError))
    }
}

/// Builds a [`RemoteDeviceClient`] per device, sharing one HTTP client
pub struct RemoteFactory {
    pub http: Arc<HttpClient>,
    pub layout: StorageLayout,
    pub poll_interval: Duration,
}

impl DeviceClientFactory for RemoteFactory {
    fn client_for(&self, device: &Device) -> Result<Box<dyn DeviceClient>, UpgradeError> {
        Ok(Box::new(RemoteDeviceClient::new(
            self.http.clone(),
            device.clone(),
            self.layout.clone(),
            self.poll_interval,
        )))
    }
}
