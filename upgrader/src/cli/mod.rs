//! Command line interface

pub mod commands;
pub mod prompt;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Exit status for configuration and startup errors
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// PAN-OS Upgrade Automation CLI
#[derive(Parser, Debug)]
#[command(
    name = "pan-os-upgrade",
    version,
    about = "PAN-OS Upgrade Automation CLI",
    long_about = "PAN-OS Upgrade Automation CLI\n\n\
                  Upgrades Palo Alto Networks firewalls one at a time or as a fleet:\n\
                  backup, pre-upgrade snapshot, readiness checks, download, install,\n\
                  reboot, post-upgrade snapshot and diff report.\n\n\
                  Runs are dry by default; pass --no-dry-run to change devices."
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file
    #[arg(long, global = true, value_name = "FILE", default_value = "settings.yaml")]
    pub settings: PathBuf,

    /// Device-control service URL; the built-in simulator is used when absent
    #[arg(long, global = true, value_name = "URL", env = "PAN_OS_CONTROLLER_URL")]
    pub controller_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the final report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upgrade a single firewall.
    Firewall(FirewallArgs),

    /// Operate against a Panorama appliance.
    ///
    /// Runs a health check, or upgrades the appliance itself when
    /// --target-version is given.
    Panorama(PanoramaArgs),

    /// Batch upgrade multiple firewalls via Panorama.
    Batch(BatchArgs),

    /// Generate a skeleton inventory.yaml.
    Inventory(InventoryArgs),

    /// Generate a skeleton settings.yaml.
    Settings(SettingsArgs),

    /// Print version information as JSON.
    Version,
}

/// Login options shared by device commands
#[derive(Args, Debug, Clone)]
pub struct CredentialArgs {
    /// Username for authentication (prompted when absent)
    #[arg(long)]
    pub username: Option<String>,

    /// Password for authentication (prompted with hidden input when absent)
    #[arg(long, env = "PAN_OS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// `--dry-run/--no-dry-run`, dry by default
#[derive(Args, Debug, Clone, Copy)]
pub struct DryRunArgs {
    /// Do not perform changes (default)
    #[arg(long, overrides_with = "no_dry_run")]
    pub dry_run: bool,

    /// Perform the upgrade
    #[arg(long, overrides_with = "dry_run")]
    pub no_dry_run: bool,
}

impl DryRunArgs {
    pub fn is_dry_run(&self) -> bool {
        !self.no_dry_run
    }
}

#[derive(Args, Debug, Clone)]
pub struct FirewallArgs {
    /// Target firewall hostname or IP
    #[arg(long)]
    pub host: String,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    /// Target PAN-OS version, e.g. 10.2.8
    #[arg(long)]
    pub target_version: String,

    #[command(flatten)]
    pub mode: DryRunArgs,
}

#[derive(Args, Debug, Clone)]
pub struct PanoramaArgs {
    /// Panorama hostname or IP
    #[arg(long)]
    pub host: String,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    /// Upgrade Panorama to this version instead of only checking its health
    #[arg(long)]
    pub target_version: Option<String>,

    #[command(flatten)]
    pub mode: DryRunArgs,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Panorama hostname or IP
    #[arg(long)]
    pub panorama_host: String,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    /// Target PAN-OS version
    #[arg(long)]
    pub target_version: String,

    /// Inventory of firewalls to upgrade
    #[arg(long, value_name = "FILE", default_value = "inventory.yaml")]
    pub inventory: PathBuf,

    #[command(flatten)]
    pub mode: DryRunArgs,
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    /// Path to inventory file
    #[arg(long, default_value = "inventory.yaml")]
    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    /// Path to settings file
    #[arg(long, default_value = "settings.yaml")]
    pub path: PathBuf,
}
