//! Read-only device health check

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::device::{DeviceClient, ReadinessResult};
use crate::errors::UpgradeError;

/// Version and readiness of a device, without changing anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub hostname: String,
    pub version: String,
    pub readiness: ReadinessResult,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.readiness.is_ready()
    }
}

pub async fn health_check(
    client: &dyn DeviceClient,
    hostname: &str,
) -> Result<HealthReport, UpgradeError> {
    let handle = client.connect().await?;
    let version = client.get_version(&handle).await?;
    let readiness = client.readiness_check(&handle).await?;
    info!(
        "{}: Running {}, readiness passed={} failed={} skipped={}",
        hostname, version, readiness.passed, readiness.failed, readiness.skipped
    );
    Ok(HealthReport {
        hostname: hostname.to_string(),
        version,
        readiness,
    })
}
