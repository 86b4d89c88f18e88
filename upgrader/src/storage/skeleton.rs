//! Skeleton configuration files

use tracing::info;

use crate::errors::UpgradeError;
use crate::filesys::file::File;

pub const INVENTORY_TEMPLATE: &str = r#"# inventory.yaml
# Define devices to target for upgrades
firewalls:
  - hostname: fw1.example.local
    ip: 192.0.2.11
    username: admin
    # password_env: FW1_PASSWORD
    # ha_mode: passive
  - hostname: fw2.example.local
    ip: 192.0.2.12
    username: admin
"#;

pub const SETTINGS_TEMPLATE: &str = r#"# settings.yaml
# Global defaults used by the tool
concurrency: 5
retry_count: 3
retry_delay_seconds: 15
pre_post_snapshots: true
generate_pdf_diff: true
# ready_timeout_secs: 600
# ready_poll_interval_secs: 10
# report_format: text
# storage_dir: assurance
"#;

/// Result of writing a skeleton file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkeletonOutcome {
    Created,
    AlreadyExists,
}

/// Write `template` to `file` unless something is already there
pub async fn write_skeleton(file: &File, template: &str) -> Result<SkeletonOutcome, UpgradeError> {
    match file.create_new(template.as_bytes()).await {
        Ok(_) => {
            info!("Created {}", file.path().display());
            Ok(SkeletonOutcome::Created)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Ok(SkeletonOutcome::AlreadyExists)
        }
        Err(e) => Err(e.into()),
    }
}
