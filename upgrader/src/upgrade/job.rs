//! Upgrade job record

use uuid::Uuid;

use crate::models::device::Device;
use crate::upgrade::fsm::{UpgradeEvent, UpgradeFsm, UpgradeState};

/// What to do to a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePlan {
    pub target_version: String,
    pub dry_run: bool,
}

impl UpgradePlan {
    pub fn new(target_version: impl Into<String>, dry_run: bool) -> Self {
        Self {
            target_version: target_version.into(),
            dry_run,
        }
    }
}

/// One in-flight orchestration of one device
///
/// State is only changed through [`UpgradeJob::apply`].
#[derive(Debug)]
pub struct UpgradeJob {
    pub id: Uuid,
    pub device: Device,
    pub plan: UpgradePlan,
    fsm: UpgradeFsm,
}

impl UpgradeJob {
    pub fn new(device: Device, plan: UpgradePlan) -> Self {
        Self {
            id: Uuid::new_v4(),
            device,
            plan,
            fsm: UpgradeFsm::new(),
        }
    }

    pub fn state(&self) -> UpgradeState {
        self.fsm.state()
    }

    pub fn attempts(&self) -> u32 {
        self.fsm.attempts()
    }

    pub fn fsm(&self) -> &UpgradeFsm {
        &self.fsm
    }

    pub fn apply(&mut self, event: UpgradeEvent) -> Result<(), String> {
        self.fsm.process(event)
    }
}
