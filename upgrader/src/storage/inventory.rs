//! Inventory file management

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::UpgradeError;
use crate::filesys::file::File;
use crate::models::device::{validate_hostname, Credentials, Device, HaRole};
use crate::storage::settings::is_blank_yaml;

/// A firewall entry in the inventory file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirewallRecord {
    pub hostname: String,

    /// Management address
    pub ip: String,

    pub username: String,

    /// Inline password; prefer `password_env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Name of an environment variable holding the password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ha_mode: Option<String>,
}

/// Inventory of firewalls to manage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Inventory {
    #[serde(default)]
    pub firewalls: Vec<FirewallRecord>,
}

impl Inventory {
    /// Load inventory from a YAML file. A missing file is an empty inventory.
    pub async fn load_from_file(file: &File) -> Result<Self, UpgradeError> {
        if !file.exists().await {
            debug!("Inventory file {:?} not found", file.path());
            return Ok(Self::default());
        }

        let contents = file.read_string().await?;
        Self::parse(&contents).map_err(|e| {
            UpgradeError::ConfigError(format!("{}: {}", file.path().display(), e))
        })
    }

    /// Parse and validate an inventory from YAML text
    pub fn parse(contents: &str) -> Result<Self, UpgradeError> {
        if is_blank_yaml(contents) {
            return Ok(Self::default());
        }

        let inventory: Inventory = serde_yaml::from_str(contents)
            .map_err(|e| UpgradeError::ConfigError(e.to_string()))?;
        inventory.validate()?;
        Ok(inventory)
    }

    pub fn validate(&self) -> Result<(), UpgradeError> {
        let mut seen = HashSet::new();
        for record in &self.firewalls {
            if record.hostname.trim().is_empty() {
                return Err(UpgradeError::ConfigError(
                    "firewall entry with empty hostname".to_string(),
                ));
            }
            validate_hostname(&record.hostname)?;
            if record.ip.trim().is_empty() {
                return Err(UpgradeError::ConfigError(format!(
                    "{}: ip must not be empty",
                    record.hostname
                )));
            }
            if !seen.insert(record.hostname.as_str()) {
                return Err(UpgradeError::ConfigError(format!(
                    "duplicate firewall hostname: {}",
                    record.hostname
                )));
            }
            if let Some(mode) = &record.ha_mode {
                mode.parse::<HaRole>().map_err(|e| {
                    UpgradeError::ConfigError(format!("{}: {}", record.hostname, e))
                })?;
            }
        }
        Ok(())
    }

    /// Resolve every record into a `Device`.
    ///
    /// The password comes from the record, then from its `password_env`
    /// variable, then from `fallback_password`.
    pub fn into_devices(self, fallback_password: Option<&str>) -> Result<Vec<Device>, UpgradeError> {
        self.firewalls
            .into_iter()
            .map(|record| record.into_device(fallback_password))
            .collect()
    }
}

impl FirewallRecord {
    pub fn into_device(self, fallback_password: Option<&str>) -> Result<Device, UpgradeError> {
        let password = match (self.password, &self.password_env) {
            (Some(password), _) => password,
            (None, Some(var)) => std::env::var(var).map_err(|_| {
                UpgradeError::ConfigError(format!(
                    "{}: environment variable {} is not set",
                    self.hostname, var
                ))
            })?,
            (None, None) => fallback_password.map(str::to_string).ok_or_else(|| {
                UpgradeError::ConfigError(format!("{}: no password available", self.hostname))
            })?,
        };

        let ha_role = match &self.ha_mode {
            Some(mode) => mode
                .parse::<HaRole>()
                .map_err(|e| UpgradeError::ConfigError(format!("{}: {}", self.hostname, e)))?,
            None => HaRole::Standalone,
        };

        let mut device = Device::new(
            self.hostname,
            self.ip,
            Credentials::new(self.username, password),
        );
        device.current_version = self.current_version;
        device.model = self.model;
        device.ha_role = ha_role;
        Ok(device)
    }
}
