//! Shared test fixtures

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use pan_os_upgrade::device::{ConnectionHandle, DeviceClient, DeviceClientFactory, ReadinessResult};
use pan_os_upgrade::errors::UpgradeError;
use pan_os_upgrade::models::artifact::ArtifactRef;
use pan_os_upgrade::models::device::{Credentials, Device, HaRole};
use pan_os_upgrade::models::snapshot::{InterfaceState, NetworkState, Route, SessionCounters};
use pan_os_upgrade::snapshot::report::TextReportRenderer;
use pan_os_upgrade::snapshot::store::SnapshotStore;
use pan_os_upgrade::storage::layout::StorageLayout;
use pan_os_upgrade::upgrade::orchestrator::{Orchestrator, OrchestratorSettings};
use pan_os_upgrade::upgrade::registry::JobRegistry;

pub const START_VERSION: &str = "10.1.3";
pub const TARGET_VERSION: &str = "10.2.8";

pub const CONNECT: &str = "connect";
pub const GET_VERSION: &str = "get_version";
pub const BACKUP: &str = "backup_config";
pub const READINESS: &str = "readiness_check";
pub const DOWNLOAD: &str = "download_image";
pub const INSTALL: &str = "install_image";
pub const REBOOT: &str = "reboot";
pub const WAIT_READY: &str = "wait_for_ready";
pub const NETWORK_STATE: &str = "collect_network_state";

pub fn device(hostname: &str) -> Device {
    Device::new(hostname, "192.0.2.10", Credentials::new("admin", "secret"))
}

pub fn device_with_role(hostname: &str, role: HaRole) -> Device {
    let mut d = device(hostname);
    d.ha_role = role;
    d
}

pub fn network_state() -> NetworkState {
    NetworkState {
        routes: vec![Route {
            destination: "0.0.0.0/0".parse().unwrap(),
            gateway: "192.168.1.1".parse().unwrap(),
            interface: "ethernet1/1".to_string(),
        }],
        interfaces: vec![InterfaceState {
            name: "ethernet1/1".to_string(),
            status: "up".to_string(),
            ip: Some("192.168.1.10/24".parse().unwrap()),
        }],
        sessions: SessionCounters {
            total: 1500,
            tcp: 1200,
            udp: 300,
        },
    }
}

/// Fast retry settings for tests
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        retry_count: 3,
        retry_delay: Duration::from_millis(10),
        pre_post_snapshots: true,
        generate_report: true,
        ready_timeout: Duration::from_secs(5),
    }
}

pub fn orchestrator(dir: &Path, settings: OrchestratorSettings) -> Orchestrator {
    Orchestrator::new(
        settings,
        SnapshotStore::new(StorageLayout::new(dir)),
        Box::new(TextReportRenderer),
        JobRegistry::new(),
    )
}

#[derive(Default)]
struct Script {
    version: String,
    staged: Option<String>,
    readiness: ReadinessResult,
    failures: HashMap<&'static str, u32>,
    calls: HashMap<&'static str, u32>,
    hang_wait_ready: bool,
    keep_version: bool,
    panic_on: Option<&'static str>,
    cancel_on_install: Option<CancellationToken>,
    latency: Duration,
}

/// Scripted device: counts calls and fails on demand. Clones share state.
#[derive(Clone)]
pub struct ScriptedClient {
    script: Arc<Mutex<Script>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        let script = Script {
            version: START_VERSION.to_string(),
            readiness: ReadinessResult {
                passed: 5,
                failed: 0,
                skipped: 3,
                details: "All critical checks passed".to_string(),
            },
            ..Default::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    /// Make `op` fail its next `times` calls
    pub fn fail_times(self, op: &'static str, times: u32) -> Self {
        self.script.lock().unwrap().failures.insert(op, times);
        self
    }

    pub fn with_readiness(self, readiness: ReadinessResult) -> Self {
        self.script.lock().unwrap().readiness = readiness;
        self
    }

    pub fn hang_on_wait_ready(self) -> Self {
        self.script.lock().unwrap().hang_wait_ready = true;
        self
    }

    /// Installing does not change the version reported after reboot
    pub fn keep_version(self) -> Self {
        self.script.lock().unwrap().keep_version = true;
        self
    }

    pub fn panic_on(self, op: &'static str) -> Self {
        self.script.lock().unwrap().panic_on = Some(op);
        self
    }

    pub fn cancel_on_install(self, cancel: CancellationToken) -> Self {
        self.script.lock().unwrap().cancel_on_install = Some(cancel);
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.script.lock().unwrap().latency = latency;
        self
    }

    pub fn calls(&self, op: &str) -> u32 {
        self.script.lock().unwrap().calls.get(op).copied().unwrap_or(0)
    }

    pub fn mutating_calls(&self) -> u32 {
        [BACKUP, DOWNLOAD, INSTALL, REBOOT, WAIT_READY]
            .iter()
            .map(|op| self.calls(op))
            .sum()
    }

    /// Record the call, then fail if scripted to
    async fn enter(&self, op: &'static str) -> Result<(), UpgradeError> {
        let (latency, fail, panic) = {
            let mut script = self.script.lock().unwrap();
            *script.calls.entry(op).or_insert(0) += 1;
            let fail = match script.failures.get_mut(op) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            (script.latency, fail, script.panic_on == Some(op))
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if panic {
            panic!("scripted panic in {}", op);
        }
        if fail {
            return Err(scripted_error(op));
        }
        Ok(())
    }
}

fn scripted_error(op: &str) -> UpgradeError {
    let message = format!("scripted {} failure", op);
    match op {
        BACKUP => UpgradeError::BackupError(message),
        DOWNLOAD => UpgradeError::DownloadError(message),
        INSTALL => UpgradeError::InstallError(message),
        NETWORK_STATE => UpgradeError::SnapshotError(message),
        _ => UpgradeError::ConnectivityError(message),
    }
}

#[async_trait]
impl DeviceClient for ScriptedClient {
    async fn connect(&self) -> Result<ConnectionHandle, UpgradeError> {
        self.enter(CONNECT).await?;
        Ok(ConnectionHandle::new("scripted", "session-1"))
    }

    async fn get_version(&self, _handle: &ConnectionHandle) -> Result<String, UpgradeError> {
        self.enter(GET_VERSION).await?;
        Ok(self.script.lock().unwrap().version.clone())
    }

    async fn backup_config(&self, _handle: &ConnectionHandle) -> Result<ArtifactRef, UpgradeError> {
        self.enter(BACKUP).await?;
        Ok(ArtifactRef {
            path: PathBuf::from("backup.xml"),
            sha256: "0".repeat(64),
        })
    }

    async fn readiness_check(
        &self,
        _handle: &ConnectionHandle,
    ) -> Result<ReadinessResult, UpgradeError> {
        self.enter(READINESS).await?;
        Ok(self.script.lock().unwrap().readiness.clone())
    }

    async fn download_image(
        &self,
        _handle: &ConnectionHandle,
        _version: &str,
    ) -> Result<(), UpgradeError> {
        self.enter(DOWNLOAD).await
    }

    async fn install_image(
        &self,
        _handle: &ConnectionHandle,
        version: &str,
    ) -> Result<(), UpgradeError> {
        self.enter(INSTALL).await?;
        let mut script = self.script.lock().unwrap();
        if let Some(cancel) = &script.cancel_on_install {
            cancel.cancel();
        }
        script.staged = Some(version.to_string());
        Ok(())
    }

    async fn reboot(&self, _handle: &ConnectionHandle) -> Result<(), UpgradeError> {
        self.enter(REBOOT).await
    }

    async fn wait_for_ready(
        &self,
        _handle: &ConnectionHandle,
        _timeout: Duration,
    ) -> Result<(), UpgradeError> {
        self.enter(WAIT_READY).await?;
        let hang = {
            let mut script = self.script.lock().unwrap();
            if !script.keep_version {
                if let Some(staged) = script.staged.take() {
                    script.version = staged;
                }
            }
            script.hang_wait_ready
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn collect_network_state(
        &self,
        _handle: &ConnectionHandle,
    ) -> Result<NetworkState, UpgradeError> {
        self.enter(NETWORK_STATE).await?;
        Ok(network_state())
    }
}

/// Hands out pre-built scripted clients by hostname
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    clients: HashMap<String, ScriptedClient>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hostname: &str, client: ScriptedClient) -> Self {
        self.clients.insert(hostname.to_string(), client);
        self
    }

    pub fn client(&self, hostname: &str) -> &ScriptedClient {
        &self.clients[hostname]
    }
}

impl DeviceClientFactory for ScriptedFactory {
    fn client_for(&self, device: &Device) -> Result<Box<dyn DeviceClient>, UpgradeError> {
        self.clients
            .get(&device.hostname)
            .cloned()
            .map(|c| Box::new(c) as Box<dyn DeviceClient>)
            .ok_or_else(|| UpgradeError::ConfigError(format!("no client for {}", device.hostname)))
    }
}
