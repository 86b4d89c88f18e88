//! Device models

use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::UpgradeError;

/// High-availability role of a firewall
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HaRole {
    /// Passive peer, upgraded first
    Passive,

    /// Not part of an HA pair
    #[default]
    Standalone,

    /// Active peer, upgraded last
    Active,
}

impl std::str::FromStr for HaRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "passive" | "active-secondary" => Ok(HaRole::Passive),
            "standalone" | "disabled" | "none" | "" => Ok(HaRole::Standalone),
            "active" | "active-primary" => Ok(HaRole::Active),
            _ => Err(format!("Invalid HA mode: {}", s)),
        }
    }
}

/// Login credentials for a device
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Arc<SecretString>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Arc::new(SecretString::from(password.into())),
        }
    }
}

/// A firewall (or manager appliance) targeted by an upgrade
#[derive(Debug, Clone)]
pub struct Device {
    /// Hostname, also the device identifier
    pub hostname: String,

    /// Management address
    pub address: String,

    /// Login credentials
    pub credentials: Credentials,

    /// Last known PAN-OS version
    pub current_version: Option<String>,

    /// HA role
    pub ha_role: HaRole,

    /// Hardware model, informational
    pub model: Option<String>,

    /// Manager appliance the device is reached through
    pub via: Option<String>,
}

impl Device {
    pub fn new(
        hostname: impl Into<String>,
        address: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            address: address.into(),
            credentials,
            current_version: None,
            ha_role: HaRole::Standalone,
            model: None,
            via: None,
        }
    }
}

/// Check that a hostname is safe to use as a single storage path component.
///
/// Accepts ASCII letters, digits and `.-_:`; rejects empty names, `.` and `..`.
pub fn validate_hostname(hostname: &str) -> Result<(), UpgradeError> {
    if hostname.is_empty() || hostname == "." || hostname == ".." {
        return Err(UpgradeError::ConfigError(format!(
            "invalid hostname {:?}",
            hostname
        )));
    }
    if let Some(c) = hostname
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':')))
    {
        return Err(UpgradeError::ConfigError(format!(
            "invalid hostname {:?}: character {:?} not allowed",
            hostname, c
        )));
    }
    Ok(())
}
