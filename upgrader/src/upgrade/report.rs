//! Per-job outcome records

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::ReadinessResult;
use crate::errors::{ErrorKind, UpgradeError};
use crate::models::artifact::ArtifactRef;
use crate::models::device::Device;
use crate::snapshot::diff::DiffSummary;
use crate::upgrade::fsm::{UpgradeState, UpgradeStep};
use crate::upgrade::job::UpgradePlan;

/// Why a step did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DryRun,
    Disabled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DryRun => f.write_str("dry run"),
            SkipReason::Disabled => f.write_str("disabled by settings"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepStatus {
    Executed,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: UpgradeStep,
    #[serde(flatten)]
    pub status: StepStatus,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl StepRecord {
    pub fn executed(step: UpgradeStep, attempts: u32, elapsed: Duration) -> Self {
        Self {
            step,
            status: StepStatus::Executed,
            attempts,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn skipped(step: UpgradeStep, reason: SkipReason) -> Self {
        Self {
            step,
            status: StepStatus::Skipped(reason),
            attempts: 0,
            duration_ms: 0,
        }
    }
}

/// Terminal outcome of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Failed {
        kind: ErrorKind,
        step: UpgradeStep,
        message: String,
    },
}

/// Archived record of one device's orchestration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub hostname: String,
    pub target_version: String,
    pub dry_run: bool,
    pub outcome: JobOutcome,
    pub final_state: UpgradeState,
    pub steps: Vec<StepRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub planned_actions: Vec<String>,
    pub version_before: Option<String>,
    pub version_after: Option<String>,
    pub readiness: Option<ReadinessResult>,
    pub backup: Option<ArtifactRef>,
    pub pre_snapshot: Option<ArtifactRef>,
    pub post_snapshot: Option<ArtifactRef>,
    pub diff: Option<DiffSummary>,
    pub report: Option<ArtifactRef>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    /// Report for a job that never reached the device
    pub fn not_started(
        device: &Device,
        plan: &UpgradePlan,
        step: UpgradeStep,
        err: &UpgradeError,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            hostname: device.hostname.clone(),
            target_version: plan.target_version.clone(),
            dry_run: plan.dry_run,
            outcome: JobOutcome::Failed {
                kind: err.kind(),
                step,
                message: err.to_string(),
            },
            final_state: UpgradeState::Failed,
            steps: Vec::new(),
            planned_actions: Vec::new(),
            version_before: device.current_version.clone(),
            version_after: None,
            readiness: None,
            backup: None,
            pre_snapshot: None,
            post_snapshot: None,
            diff: None,
            report: None,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, JobOutcome::Failed { .. })
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            JobOutcome::Failed { kind, .. } => Some(*kind),
            JobOutcome::Completed => None,
        }
    }

    pub fn step(&self, step: UpgradeStep) -> Option<&StepRecord> {
        self.steps.iter().find(|r| r.step == step)
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at).to_std().unwrap_or_default()
    }
}
