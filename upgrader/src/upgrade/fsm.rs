//! Finite State Machine for a single device upgrade

use serde::{Deserialize, Serialize};

/// Upgrade state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeState {
    /// Initial state, nothing done yet
    Pending,

    /// Session established and version read
    Connected,

    /// Running configuration exported
    BackedUp,

    /// Pre-upgrade snapshot taken
    PreSnapshotted,

    /// Readiness checks passed
    ReadinessChecked,

    /// Target image downloaded
    Downloaded,

    /// Target image installed
    Installed,

    /// Reboot issued
    Rebooted,

    /// Device answering again after reboot
    PostReady,

    /// Post-upgrade snapshot compared
    Diffed,

    /// Upgrade finished
    Completed,

    /// Upgrade failed
    Failed,
}

impl UpgradeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpgradeState::Completed | UpgradeState::Failed)
    }

    /// The step that leaves this state, if any
    pub fn next_step(&self) -> Option<UpgradeStep> {
        match self {
            UpgradeState::Pending => Some(UpgradeStep::Connect),
            UpgradeState::Connected => Some(UpgradeStep::Backup),
            UpgradeState::BackedUp => Some(UpgradeStep::PreSnapshot),
            UpgradeState::PreSnapshotted => Some(UpgradeStep::ReadinessCheck),
            UpgradeState::ReadinessChecked => Some(UpgradeStep::Download),
            UpgradeState::Downloaded => Some(UpgradeStep::Install),
            UpgradeState::Installed => Some(UpgradeStep::Reboot),
            UpgradeState::Rebooted => Some(UpgradeStep::WaitReady),
            UpgradeState::PostReady => Some(UpgradeStep::Diff),
            UpgradeState::Diffed | UpgradeState::Completed | UpgradeState::Failed => None,
        }
    }
}

/// A unit of work between two upgrade states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStep {
    Connect,
    Backup,
    PreSnapshot,
    ReadinessCheck,
    Download,
    Install,
    Reboot,
    WaitReady,
    /// Post-upgrade snapshot, comparison and report
    Diff,
}

impl UpgradeStep {
    pub const ALL: [UpgradeStep; 9] = [
        UpgradeStep::Connect,
        UpgradeStep::Backup,
        UpgradeStep::PreSnapshot,
        UpgradeStep::ReadinessCheck,
        UpgradeStep::Download,
        UpgradeStep::Install,
        UpgradeStep::Reboot,
        UpgradeStep::WaitReady,
        UpgradeStep::Diff,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            UpgradeStep::Connect => "connect",
            UpgradeStep::Backup => "backup",
            UpgradeStep::PreSnapshot => "pre_snapshot",
            UpgradeStep::ReadinessCheck => "readiness_check",
            UpgradeStep::Download => "download",
            UpgradeStep::Install => "install",
            UpgradeStep::Reboot => "reboot",
            UpgradeStep::WaitReady => "wait_ready",
            UpgradeStep::Diff => "diff",
        }
    }

    pub fn target_state(&self) -> UpgradeState {
        match self {
            UpgradeStep::Connect => UpgradeState::Connected,
            UpgradeStep::Backup => UpgradeState::BackedUp,
            UpgradeStep::PreSnapshot => UpgradeState::PreSnapshotted,
            UpgradeStep::ReadinessCheck => UpgradeState::ReadinessChecked,
            UpgradeStep::Download => UpgradeState::Downloaded,
            UpgradeStep::Install => UpgradeState::Installed,
            UpgradeStep::Reboot => UpgradeState::Rebooted,
            UpgradeStep::WaitReady => UpgradeState::PostReady,
            UpgradeStep::Diff => UpgradeState::Diffed,
        }
    }

    /// Whether a job may stop before running this step
    pub fn is_safe_abort_point(&self) -> bool {
        !matches!(
            self,
            UpgradeStep::Reboot | UpgradeStep::WaitReady | UpgradeStep::Diff
        )
    }

    /// Steps that change the device and are skipped on a dry run
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            UpgradeStep::Backup
                | UpgradeStep::Download
                | UpgradeStep::Install
                | UpgradeStep::Reboot
                | UpgradeStep::WaitReady
        )
    }
}

impl std::fmt::Display for UpgradeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Upgrade event
#[derive(Debug, Clone)]
pub enum UpgradeEvent {
    /// Step ran and succeeded
    StepSucceeded(UpgradeStep),

    /// Step was not run (dry run or disabled)
    StepSkipped(UpgradeStep),

    /// One attempt of a step failed; the state does not change
    AttemptFailed(UpgradeStep, String),

    /// The job cannot continue
    Fail(UpgradeStep, String),

    /// All steps done
    Finish,
}

/// Upgrade FSM
#[derive(Debug, Clone)]
pub struct UpgradeFsm {
    state: UpgradeState,
    error: Option<String>,
    attempts: u32,
    failed_step: Option<UpgradeStep>,
}

impl UpgradeFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: UpgradeState::Pending,
            error: None,
            attempts: 0,
            failed_step: None,
        }
    }

    pub fn state(&self) -> UpgradeState {
        self.state
    }

    /// Last error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Failed attempts on the current step
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn failed_step(&self) -> Option<UpgradeStep> {
        self.failed_step
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: UpgradeEvent) -> Result<(), String> {
        let expected = self.state.next_step();

        let new_state = match (&self.state, &event) {
            (state, UpgradeEvent::StepSucceeded(step) | UpgradeEvent::StepSkipped(step))
                if !state.is_terminal() && expected == Some(*step) =>
            {
                self.attempts = 0;
                self.error = None;
                step.target_state()
            }

            (state, UpgradeEvent::AttemptFailed(step, err))
                if !state.is_terminal() && expected == Some(*step) =>
            {
                self.attempts += 1;
                self.error = Some(err.clone());
                *state
            }

            (state, UpgradeEvent::Fail(step, err)) if !state.is_terminal() => {
                self.error = Some(err.clone());
                self.failed_step = Some(*step);
                UpgradeState::Failed
            }

            (UpgradeState::Diffed, UpgradeEvent::Finish) => UpgradeState::Completed,

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }

    /// Check if the current step may be attempted again
    pub fn can_retry(&self, max_attempts: u32) -> bool {
        !self.state.is_terminal() && self.attempts < max_attempts
    }
}

impl Default for UpgradeFsm {
    fn default() -> Self {
        Self::new()
    }
}
