//! Bounded concurrent upgrade of many devices
//!
//! Jobs are launched one at a time in HA order, each holding a semaphore
//! permit for its lifetime. A job's failure only affects its own report.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::device::DeviceClientFactory;
use crate::errors::UpgradeError;
use crate::fleet::summary::FleetReport;
use crate::models::device::Device;
use crate::upgrade::fsm::UpgradeStep;
use crate::upgrade::job::UpgradePlan;
use crate::upgrade::orchestrator::Orchestrator;
use crate::upgrade::report::JobReport;

/// Passive HA peers first, then standalone devices, then active peers.
/// Inventory order is kept within each group.
pub fn launch_order(mut devices: Vec<Device>) -> Vec<Device> {
    devices.sort_by_key(|d| d.ha_role);
    devices
}

pub struct FleetScheduler {
    orchestrator: Arc<Orchestrator>,
    factory: Arc<dyn DeviceClientFactory>,
    concurrency: usize,
}

impl FleetScheduler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        factory: Arc<dyn DeviceClientFactory>,
        concurrency: usize,
    ) -> Self {
        Self {
            orchestrator,
            factory,
            concurrency: concurrency.max(1),
        }
    }

    /// Upgrade every device and collect one report per device
    pub async fn run(
        &self,
        devices: Vec<Device>,
        plan: UpgradePlan,
        cancel: &CancellationToken,
    ) -> FleetReport {
        let started_at = Utc::now();
        let devices = launch_order(devices);
        info!(
            "Upgrading {} device(s) to {} with concurrency {}",
            devices.len(),
            plan.target_version,
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles: Vec<(Device, JoinHandle<JobReport>)> = Vec::with_capacity(devices.len());
        let mut not_launched = Vec::new();

        let mut pending = devices.into_iter();
        for device in pending.by_ref() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                not_launched.push(device);
                break;
            };

            let orchestrator = self.orchestrator.clone();
            let factory = self.factory.clone();
            let job_cancel = cancel.clone();
            let plan = plan.clone();
            let job_device = device.clone();

            handles.push((
                device,
                tokio::spawn(async move {
                    let _permit = permit;
                    let client = match factory.client_for(&job_device) {
                        Ok(client) => client,
                        Err(e) => {
                            error!("{}: {}", job_device.hostname, e);
                            return JobReport::not_started(&job_device, &plan, UpgradeStep::Connect, &e);
                        }
                    };
                    orchestrator
                        .run(client.as_ref(), job_device, plan, &job_cancel)
                        .await
                }),
            ));
        }
        not_launched.extend(pending);

        let (launched, handles): (Vec<Device>, Vec<JoinHandle<JobReport>>) =
            handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut jobs = Vec::with_capacity(launched.len() + not_launched.len());
        for (device, result) in launched.into_iter().zip(results) {
            match result {
                Ok(report) => jobs.push(report),
                Err(e) => {
                    error!("{}: Job task failed: {}", device.hostname, e);
                    let err = UpgradeError::Internal(format!("job task failed: {}", e));
                    jobs.push(JobReport::not_started(&device, &plan, UpgradeStep::Connect, &err));
                }
            }
        }

        if !not_launched.is_empty() {
            warn!("Cancelled before launching {} device(s)", not_launched.len());
        }
        for device in not_launched {
            let err = UpgradeError::CancelledError("fleet run cancelled before launch".to_string());
            jobs.push(JobReport::not_started(&device, &plan, UpgradeStep::Connect, &err));
        }

        FleetReport {
            started_at,
            finished_at: Utc::now(),
            jobs,
        }
    }
}
