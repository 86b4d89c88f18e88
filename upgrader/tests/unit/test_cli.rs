//! Command line tests

use std::path::Path;

use clap::error::ErrorKind as ClapErrorKind;
use clap::Parser;

use pan_os_upgrade::cli::commands::execute;
use pan_os_upgrade::cli::{Cli, Commands};
use pan_os_upgrade::errors::UpgradeError;
use pan_os_upgrade::models::snapshot::Phase;
use pan_os_upgrade::storage::layout::StorageLayout;
use pan_os_upgrade::storage::skeleton::{INVENTORY_TEMPLATE, SETTINGS_TEMPLATE};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("pan-os-upgrade").chain(args.iter().copied())).unwrap()
}

async fn run(args: &[&str]) -> Result<u8, UpgradeError> {
    execute(parse(args), std::future::pending::<()>()).await
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_app_help() {
    let err = Cli::try_parse_from(["pan-os-upgrade", "--help"]).unwrap_err();
    assert_eq!(err.kind(), ClapErrorKind::DisplayHelp);
    assert!(err.to_string().contains("PAN-OS Upgrade Automation CLI"));
}

#[test]
fn test_firewall_command_help() {
    let err = Cli::try_parse_from(["pan-os-upgrade", "firewall", "--help"]).unwrap_err();
    assert_eq!(err.kind(), ClapErrorKind::DisplayHelp);
    assert!(err.to_string().contains("Upgrade a single firewall"));
}

#[test]
fn test_dry_run_is_the_default() {
    let cli = parse(&["firewall", "--host", "fw1", "--target-version", "10.2.8"]);
    let Commands::Firewall(args) = cli.command else {
        panic!("expected firewall command");
    };
    assert!(args.mode.is_dry_run());
    assert_eq!(args.target_version, "10.2.8");
    assert!(args.credentials.username.is_none());

    let cli = parse(&["firewall", "--host", "fw1", "--target-version", "10.2.8", "--no-dry-run"]);
    let Commands::Firewall(args) = cli.command else {
        panic!("expected firewall command");
    };
    assert!(!args.mode.is_dry_run());

    // last flag wins
    let cli = parse(&[
        "firewall",
        "--host",
        "fw1",
        "--target-version",
        "10.2.8",
        "--no-dry-run",
        "--dry-run",
    ]);
    let Commands::Firewall(args) = cli.command else {
        panic!("expected firewall command");
    };
    assert!(args.mode.is_dry_run());
}

#[test]
fn test_firewall_requires_target_version() {
    let err = Cli::try_parse_from(["pan-os-upgrade", "firewall", "--host", "fw1"]).unwrap_err();
    assert_eq!(err.kind(), ClapErrorKind::MissingRequiredArgument);
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = parse(&[
        "batch",
        "--panorama-host",
        "pano",
        "--target-version",
        "10.2.8",
        "--json",
        "--settings",
        "custom.yaml",
    ]);
    assert!(cli.json);
    assert_eq!(cli.settings, Path::new("custom.yaml"));
    assert!(cli.controller_url.is_none());
}

#[tokio::test]
async fn test_inventory_command() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test_inventory.yaml");

    assert_eq!(run(&["inventory", "--path", path_str(&path)]).await.unwrap(), 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), INVENTORY_TEMPLATE);

    // never overwritten
    std::fs::write(&path, "firewalls: []\n").unwrap();
    assert_eq!(run(&["inventory", "--path", path_str(&path)]).await.unwrap(), 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "firewalls: []\n");
}

#[tokio::test]
async fn test_settings_command() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test_settings.yaml");

    assert_eq!(run(&["settings", "--path", path_str(&path)]).await.unwrap(), 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), SETTINGS_TEMPLATE);
}

#[tokio::test]
async fn test_malformed_settings_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let settings = dir.path().join("settings.yaml");
    std::fs::write(&settings, "concurrency: [not, a, number]\n").unwrap();

    let err = run(&[
        "firewall",
        "--host",
        "fw1",
        "--username",
        "admin",
        "--password",
        "pw",
        "--target-version",
        "10.2.8",
        "--settings",
        path_str(&settings),
    ])
    .await
    .unwrap_err();
    assert!(matches!(err, UpgradeError::ConfigError(_)));
}

#[tokio::test]
async fn test_batch_without_inventory_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let inventory = dir.path().join("missing.yaml");
    let settings = dir.path().join("settings.yaml");

    let err = run(&[
        "batch",
        "--panorama-host",
        "pano",
        "--username",
        "admin",
        "--password",
        "pw",
        "--target-version",
        "10.2.8",
        "--inventory",
        path_str(&inventory),
        "--settings",
        path_str(&settings),
    ])
    .await
    .unwrap_err();
    assert!(matches!(err, UpgradeError::ConfigError(_)));
}

#[tokio::test]
async fn test_batch_dry_run_against_simulator() {
    let dir = tempfile::tempdir().unwrap();
    let storage = dir.path().join("assurance");
    let settings = dir.path().join("settings.yaml");
    std::fs::write(
        &settings,
        format!(
            "concurrency: 2\nretry_delay_seconds: 1\nreport_format: json\nstorage_dir: {}\n",
            path_str(&storage)
        ),
    )
    .unwrap();

    let inventory = dir.path().join("inventory.yaml");
    std::fs::write(
        &inventory,
        r#"firewalls:
  - hostname: fw1.example.local
    ip: 192.0.2.11
    username: admin
  - hostname: fw2.example.local
    ip: 192.0.2.12
    username: admin
    password: other
    ha_mode: passive
"#,
    )
    .unwrap();

    let code = run(&[
        "batch",
        "--panorama-host",
        "pano",
        "--username",
        "admin",
        "--password",
        "pw",
        "--target-version",
        "10.2.8",
        "--inventory",
        path_str(&inventory),
        "--settings",
        path_str(&settings),
        "--json",
    ])
    .await
    .unwrap();
    assert_eq!(code, 0);

    let layout = StorageLayout::new(&storage);
    for host in ["fw1.example.local", "fw2.example.local"] {
        for phase in [Phase::Pre, Phase::Post] {
            let files = layout.phase_dir(host, phase).list_files().await.unwrap();
            assert_eq!(files.len(), 1, "{} {} snapshots", host, phase);
        }
        let reports = layout.diff_dir(host).list_files().await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(path_str(&reports[0]).ends_with("_report.json"));
        // dry run takes no backup
        assert!(layout.backups_dir(host).list_files().await.unwrap().is_empty());
    }
}

fn storage_settings(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let storage = dir.join("assurance");
    let settings = dir.join("settings.yaml");
    std::fs::write(
        &settings,
        format!("retry_delay_seconds: 1\nstorage_dir: {}\n", path_str(&storage)),
    )
    .unwrap();
    (settings, storage)
}

#[tokio::test]
async fn test_panorama_health_check_against_simulator() {
    let dir = tempfile::tempdir().unwrap();
    let (settings, storage) = storage_settings(dir.path());

    let code = run(&[
        "panorama",
        "--host",
        "pano",
        "--username",
        "admin",
        "--password",
        "pw",
        "--settings",
        path_str(&settings),
        "--json",
    ])
    .await
    .unwrap();
    assert_eq!(code, 0);

    // read-only: nothing captured
    let layout = StorageLayout::new(&storage);
    assert!(layout.device_snapshots_dir("pano").list_files().await.unwrap().is_empty());
    assert!(layout.backups_dir("pano").list_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_panorama_dry_run_upgrade_against_simulator() {
    let dir = tempfile::tempdir().unwrap();
    let (settings, storage) = storage_settings(dir.path());

    let code = run(&[
        "panorama",
        "--host",
        "pano",
        "--username",
        "admin",
        "--password",
        "pw",
        "--target-version",
        "10.2.8",
        "--settings",
        path_str(&settings),
    ])
    .await
    .unwrap();
    assert_eq!(code, 0);

    let layout = StorageLayout::new(&storage);
    let pre = layout.phase_dir("pano", Phase::Pre).list_files().await.unwrap();
    assert_eq!(pre.len(), 1);
}

#[tokio::test]
async fn test_path_like_host_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let (settings, storage) = storage_settings(dir.path());

    let err = run(&[
        "firewall",
        "--host",
        "../escaped",
        "--username",
        "admin",
        "--password",
        "pw",
        "--target-version",
        "10.2.8",
        "--settings",
        path_str(&settings),
    ])
    .await
    .unwrap_err();
    assert!(matches!(err, UpgradeError::ConfigError(_)));
    assert!(!dir.path().join("escaped").exists());
    assert!(!storage.join("escaped").exists());
}
