//! Error types for the upgrade tool

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the upgrade tool
#[derive(Error, Debug)]
pub enum UpgradeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Connectivity error: {0}")]
    ConnectivityError(String),

    #[error("Backup error: {0}")]
    BackupError(String),

    #[error("Snapshot error: {0}")]
    SnapshotError(String),

    #[error("Readiness check failed: {failed} check(s) failed ({details})")]
    ReadinessError { failed: u32, details: String },

    #[error("Download error: {0}")]
    DownloadError(String),

    #[error("Install error: {0}")]
    InstallError(String),

    #[error("Device did not become ready within {0:?} after reboot")]
    PostRebootTimeoutError(Duration),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("An upgrade job is already active for {0}")]
    DuplicateJobError(String),

    #[error("Cancelled: {0}")]
    CancelledError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UpgradeError {
    /// Classify the error for reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpgradeError::HttpError(_) | UpgradeError::ConnectivityError(_) => {
                ErrorKind::Connectivity
            }
            UpgradeError::BackupError(_) => ErrorKind::Backup,
            UpgradeError::SnapshotError(_) => ErrorKind::Snapshot,
            UpgradeError::ReadinessError { .. } => ErrorKind::Readiness,
            UpgradeError::DownloadError(_) => ErrorKind::Download,
            UpgradeError::InstallError(_) => ErrorKind::Install,
            UpgradeError::PostRebootTimeoutError(_) => ErrorKind::PostRebootTimeout,
            UpgradeError::ConfigError(_) | UpgradeError::YamlError(_) => ErrorKind::Config,
            UpgradeError::IoError(_)
            | UpgradeError::JsonError(_)
            | UpgradeError::StorageError(_) => ErrorKind::Storage,
            UpgradeError::DuplicateJobError(_) => ErrorKind::DuplicateJob,
            UpgradeError::CancelledError(_) => ErrorKind::Cancelled,
            UpgradeError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether another attempt of the same step may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connectivity
                | ErrorKind::Backup
                | ErrorKind::Snapshot
                | ErrorKind::Download
                | ErrorKind::Install
        )
    }
}

/// Error classification carried in job reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connectivity,
    Backup,
    Snapshot,
    Readiness,
    Download,
    Install,
    PostRebootTimeout,
    Config,
    Storage,
    DuplicateJob,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connectivity => "ConnectivityError",
            ErrorKind::Backup => "BackupError",
            ErrorKind::Snapshot => "SnapshotError",
            ErrorKind::Readiness => "ReadinessError",
            ErrorKind::Download => "DownloadError",
            ErrorKind::Install => "InstallError",
            ErrorKind::PostRebootTimeout => "PostRebootTimeoutError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Storage => "StorageError",
            ErrorKind::DuplicateJob => "DuplicateJobError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Internal => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
