//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::UpgradeError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Output format of rendered diff reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Process-wide settings, loaded once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Maximum number of devices upgraded at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts per step before a job fails
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Delay between attempts of the same step
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,

    /// Capture network state before and after the upgrade
    #[serde(default = "default_true")]
    pub pre_post_snapshots: bool,

    /// Render a diff report document
    #[serde(default = "default_true")]
    pub generate_pdf_diff: bool,

    /// How long to wait for a device to come back after reboot
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    /// Interval between readiness polls after reboot
    #[serde(default = "default_ready_poll_interval_secs")]
    pub ready_poll_interval_secs: u64,

    /// Format of the rendered diff report
    #[serde(default)]
    pub report_format: ReportFormat,

    /// Root directory for snapshots, backups, reports and logs
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Also write logs under `<storage_dir>/logs`
    #[serde(default)]
    pub log_to_file: bool,
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    5
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_seconds() -> u64 {
    15
}

fn default_ready_timeout_secs() -> u64 {
    600
}

fn default_ready_poll_interval_secs() -> u64 {
    10
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("assurance")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retry_count: default_retry_count(),
            retry_delay_seconds: default_retry_delay_seconds(),
            pre_post_snapshots: true,
            generate_pdf_diff: true,
            ready_timeout_secs: default_ready_timeout_secs(),
            ready_poll_interval_secs: default_ready_poll_interval_secs(),
            report_format: ReportFormat::Text,
            storage_dir: default_storage_dir(),
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file.
    ///
    /// A missing or empty file yields the defaults; a malformed one is a
    /// `ConfigError`.
    pub async fn load_from_file(file: &File) -> Result<Self, UpgradeError> {
        if !file.exists().await {
            debug!("Settings file {:?} not found, using defaults", file.path());
            return Ok(Self::default());
        }

        let contents = file.read_string().await?;
        let settings = Self::parse(&contents).map_err(|e| {
            UpgradeError::ConfigError(format!("{}: {}", file.path().display(), e))
        })?;
        Ok(settings)
    }

    /// Parse and validate settings from YAML text
    pub fn parse(contents: &str) -> Result<Self, UpgradeError> {
        if is_blank_yaml(contents) {
            return Ok(Self::default());
        }

        let settings: Settings = serde_yaml::from_str(contents)
            .map_err(|e| UpgradeError::ConfigError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), UpgradeError> {
        if self.concurrency == 0 {
            return Err(UpgradeError::ConfigError(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.ready_timeout_secs == 0 {
            return Err(UpgradeError::ConfigError(
                "ready_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.ready_poll_interval_secs == 0 {
            return Err(UpgradeError::ConfigError(
                "ready_poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_secs(self.ready_poll_interval_secs)
    }
}

/// True when the document holds nothing but comments and whitespace
pub(crate) fn is_blank_yaml(contents: &str) -> bool {
    contents.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---"
    })
}
