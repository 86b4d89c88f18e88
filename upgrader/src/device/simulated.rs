//! In-process firewall simulation
//!
//! Used when no device-control service is configured. It behaves like a
//! healthy firewall: images must be downloaded before install, an installed
//! image only becomes the running version after a reboot, and a rebooting
//! device answers a few readiness polls with "not ready" first.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::device::poll::poll_until_ready;
use crate::device::{ConnectionHandle, DeviceClient, DeviceClientFactory, ReadinessResult};
use crate::errors::UpgradeError;
use crate::models::artifact::ArtifactRef;
use crate::models::device::Device;
use crate::models::snapshot::{InterfaceState, NetworkState, Route, SessionCounters};
use crate::storage::layout::StorageLayout;
use crate::utils::file_timestamp;

pub const DEFAULT_VERSION: &str = "10.1.3";

/// Behaviour of a simulated firewall
#[derive(Debug, Clone)]
pub struct SimulationProfile {
    /// Running version when the device reports none
    pub version: String,
    pub readiness: ReadinessResult,
    pub network: NetworkState,
    /// Readiness polls answered "not ready" after a reboot
    pub boot_polls: u32,
    pub poll_interval: Duration,
    /// Added to every operation
    pub latency: Duration,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            readiness: ReadinessResult {
                passed: 5,
                failed: 0,
                skipped: 3,
                details: "All critical checks passed".to_string(),
            },
            network: default_network_state(),
            boot_polls: 3,
            poll_interval: Duration::from_secs(10),
            latency: Duration::ZERO,
        }
    }
}

fn default_network_state() -> NetworkState {
    fn route(dest: &str, gw: [u8; 4], iface: &str) -> Option<Route> {
        Some(Route {
            destination: dest.parse().ok()?,
            gateway: IpAddr::V4(Ipv4Addr::from(gw)),
            interface: iface.to_string(),
        })
    }

    NetworkState {
        routes: [
            route("0.0.0.0/0", [192, 168, 1, 1], "ethernet1/1"),
            route("10.0.0.0/8", [192, 168, 1, 254], "ethernet1/2"),
        ]
        .into_iter()
        .flatten()
        .collect(),
        interfaces: vec![
            InterfaceState {
                name: "ethernet1/1".to_string(),
                status: "up".to_string(),
                ip: "192.168.1.10/24".parse().ok(),
            },
            InterfaceState {
                name: "ethernet1/2".to_string(),
                status: "up".to_string(),
                ip: "10.10.10.1/24".parse().ok(),
            },
        ],
        sessions: SessionCounters {
            total: 1500,
            tcp: 1200,
            udp: 300,
        },
    }
}

#[derive(Debug, Default)]
struct SimState {
    session_id: Option<String>,
    running_version: String,
    downloaded: HashSet<String>,
    staged: Option<String>,
    boot_polls_remaining: Option<u32>,
}

/// A simulated firewall
pub struct SimulatedFirewall {
    device: Device,
    profile: SimulationProfile,
    layout: StorageLayout,
    state: Mutex<SimState>,
}

impl SimulatedFirewall {
    pub fn new(device: Device, profile: SimulationProfile, layout: StorageLayout) -> Self {
        let running_version = device
            .current_version
            .clone()
            .unwrap_or_else(|| profile.version.clone());
        Self {
            device,
            profile,
            layout,
            state: Mutex::new(SimState {
                running_version,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn delay(&self) {
        if !self.profile.latency.is_zero() {
            tokio::time::sleep(self.profile.latency).await;
        }
    }

    fn ensure_session(&self, handle: &ConnectionHandle) -> Result<(), UpgradeError> {
        let state = self.lock();
        if state.session_id.as_deref() != Some(handle.session_id.as_str()) {
            return Err(UpgradeError::ConnectivityError(format!(
                "{}: session {} is not valid",
                self.device.hostname, handle.session_id
            )));
        }
        if state.boot_polls_remaining.is_some() {
            return Err(UpgradeError::ConnectivityError(format!(
                "{}: device is rebooting",
                self.device.hostname
            )));
        }
        Ok(())
    }

    /// Advance the boot sequence by one poll, returning readiness
    fn boot_tick(&self) -> bool {
        let mut state = self.lock();
        match state.boot_polls_remaining {
            None => true,
            Some(0) => {
                state.boot_polls_remaining = None;
                if let Some(version) = state.staged.take() {
                    state.running_version = version;
                }
                true
            }
            Some(n) => {
                state.boot_polls_remaining = Some(n - 1);
                false
            }
        }
    }

    fn render_config(&self, version: &str) -> String {
        format!(
            "<config version=\"{}\">\n  <devices>\n    <entry name=\"{}\">\n      <deviceconfig>\n        <system>\n          <ip-address>{}</ip-address>\n        </system>\n      </deviceconfig>\n    </entry>\n  </devices>\n</config>\n",
            version, self.device.hostname, self.device.address
        )
    }
}

#[async_trait]
impl DeviceClient for SimulatedFirewall {
    async fn connect(&self) -> Result<ConnectionHandle, UpgradeError> {
        self.delay().await;
        let session_id = uuid::Uuid::new_v4().to_string();
        {
            let mut state = self.lock();
            if state.boot_polls_remaining.is_some() {
                return Err(UpgradeError::ConnectivityError(format!(
                    "{}: connection refused",
                    self.device.hostname
                )));
            }
            state.session_id = Some(session_id.clone());
        }
        info!("{}: Connected to {}", self.device.hostname, self.device.address);
        Ok(ConnectionHandle::new(&self.device.hostname, session_id))
    }

    async fn get_version(&self, handle: &ConnectionHandle) -> Result<String, UpgradeError> {
        self.delay().await;
        self.ensure_session(handle)?;
        Ok(self.lock().running_version.clone())
    }

    async fn backup_config(&self, handle: &ConnectionHandle) -> Result<ArtifactRef, UpgradeError> {
        self.delay().await;
        self.ensure_session(handle)?;
        let version = self.lock().running_version.clone();
        let config = self.render_config(&version);
        let artifact = self
            .layout
            .backups_dir(&self.device.hostname)
            .create_unique_file(&file_timestamp(chrono::Utc::now()), "xml", config.as_bytes())
            .await
            .map_err(|e| UpgradeError::BackupError(e.to_string()))?;
        info!("{}: Configuration backed up to {}", self.device.hostname, artifact.path.display());
        Ok(artifact)
    }

    async fn readiness_check(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<ReadinessResult, UpgradeError> {
        self.delay().await;
        self.ensure_session(handle)?;
        Ok(self.profile.readiness.clone())
    }

    async fn download_image(
        &self,
        handle: &ConnectionHandle,
        version: &str,
    ) -> Result<(), UpgradeError> {
        self.delay().await;
        self.ensure_session(handle)?;
        info!("{}: Downloading PAN-OS {}", self.device.hostname, version);
        self.lock().downloaded.insert(version.to_string());
        Ok(())
    }

    async fn install_image(
        &self,
        handle: &ConnectionHandle,
        version: &str,
    ) -> Result<(), UpgradeError> {
        self.delay().await;
        self.ensure_session(handle)?;
        let mut state = self.lock();
        if !state.downloaded.contains(version) {
            return Err(UpgradeError::InstallError(format!(
                "{}: image {} has not been downloaded",
                self.device.hostname, version
            )));
        }
        info!("{}: Installing PAN-OS {}", self.device.hostname, version);
        state.staged = Some(version.to_string());
        Ok(())
    }

    async fn reboot(&self, handle: &ConnectionHandle) -> Result<(), UpgradeError> {
        self.delay().await;
        self.ensure_session(handle)?;
        let mut state = self.lock();
        info!("{}: Rebooting", self.device.hostname);
        state.boot_polls_remaining = Some(self.profile.boot_polls);
        Ok(())
    }

    async fn wait_for_ready(
        &self,
        _handle: &ConnectionHandle,
        timeout: Duration,
    ) -> Result<(), UpgradeError> {
        info!("{}: Waiting for device to come back online", self.device.hostname);
        poll_until_ready(
            || {
                let ready = self.boot_tick();
                debug!("{}: ready={}", self.device.hostname, ready);
                async move { Ok::<_, UpgradeError>(ready) }
            },
            timeout,
            self.profile.poll_interval,
        )
        .await
    }

    async fn collect_network_state(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<NetworkState, UpgradeError> {
        self.delay().await;
        self.ensure_session(handle)?;
        Ok(self.profile.network.clone())
    }
}

/// Builds a [`SimulatedFirewall`] per device
#[derive(Debug, Clone)]
pub struct SimulatedFactory {
    pub profile: SimulationProfile,
    pub layout: StorageLayout,
}

impl DeviceClientFactory for SimulatedFactory {
    fn client_for(&self, device: &Device) -> Result<Box<dyn DeviceClient>, UpgradeError> {
        Ok(Box::new(SimulatedFirewall::new(
            device.clone(),
            self.profile.clone(),
            self.layout.clone(),
        )))
    }
}
