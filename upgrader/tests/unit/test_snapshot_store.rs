//! Snapshot store and comparison tests

use std::time::Duration;

use pan_os_upgrade::device::simulated::{SimulatedFirewall, SimulationProfile};
use pan_os_upgrade::device::DeviceClient;
use pan_os_upgrade::models::snapshot::{InterfaceState, Phase, Snapshot};
use pan_os_upgrade::snapshot::diff::{diff, Change};
use pan_os_upgrade::snapshot::report::{render_report, JsonReportRenderer};
use pan_os_upgrade::snapshot::store::SnapshotStore;
use pan_os_upgrade::storage::layout::StorageLayout;

use crate::common::{device, network_state};

fn simulator(dir: &std::path::Path) -> SimulatedFirewall {
    let profile = SimulationProfile {
        boot_polls: 1,
        poll_interval: Duration::from_millis(1),
        ..Default::default()
    };
    SimulatedFirewall::new(device("fw1"), profile, StorageLayout::new(dir))
}

#[tokio::test]
async fn test_unchanged_device_yields_empty_diff() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(StorageLayout::new(dir.path()));
    let fw = simulator(dir.path());
    let handle = fw.connect().await.unwrap();

    let pre = store
        .take_snapshot(&fw, &handle, "fw1", Phase::Pre)
        .await
        .unwrap();
    let post = store
        .take_snapshot(&fw, &handle, "fw1", Phase::Post)
        .await
        .unwrap();

    assert!(pre.artifact.path.exists());
    assert_eq!(store.list("fw1", Phase::Pre).await.unwrap().len(), 1);
    assert_eq!(store.list("fw1", Phase::Post).await.unwrap().len(), 1);

    let report = diff(&pre.snapshot, &post.snapshot);
    assert!(report.is_empty());
    assert_eq!(
        report.summary().to_string(),
        "0 route change(s), 0 interface change(s), sessions +0"
    );
}

#[tokio::test]
async fn test_snapshots_are_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(StorageLayout::new(dir.path()));

    let snapshot = Snapshot::new("fw1", Phase::Pre, network_state());
    let first = store.write(&snapshot).await.unwrap();
    let second = store.write(&snapshot).await.unwrap();

    assert_ne!(first.path, second.path);
    assert_eq!(store.list("fw1", Phase::Pre).await.unwrap().len(), 2);
    assert_eq!(store.load(&first.path).await.unwrap(), snapshot);
}

#[tokio::test]
async fn test_latest_post_snapshot_against_pre() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path());
    let store = SnapshotStore::new(layout.clone());

    let pre = Snapshot::new("fw1", Phase::Pre, network_state());
    store.write(&pre).await.unwrap();

    let mut changed = network_state();
    changed.interfaces[0].status = "down".to_string();
    changed.interfaces.push(InterfaceState {
        name: "ethernet1/3".to_string(),
        status: "up".to_string(),
        ip: None,
    });
    changed.sessions.total = 900;
    let mut post = Snapshot::new("fw1", Phase::Post, changed);
    post.timestamp = pre.timestamp + chrono::Duration::seconds(60);
    store.write(&post).await.unwrap();

    assert!(store.latest("fw1", Phase::Post).await.unwrap().is_some());
    assert!(store.latest("fw2", Phase::Post).await.unwrap().is_none());

    let latest_pre = store.latest("fw1", Phase::Pre).await.unwrap().unwrap();
    let latest_post = store.latest("fw1", Phase::Post).await.unwrap().unwrap();
    let report = diff(&latest_pre, &latest_post);

    assert!(report.routes.is_empty());
    assert_eq!(report.interfaces.len(), 2);
    assert!(matches!(&report.interfaces[0], Change::Changed { key, .. } if key == "ethernet1/1"));
    assert!(matches!(&report.interfaces[1], Change::Added { key, .. } if key == "ethernet1/3"));
    assert_eq!(report.sessions.total, -600);

    let artifact = render_report(&layout, &report, &JsonReportRenderer)
        .await
        .unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&artifact.path).unwrap()).unwrap();
    assert_eq!(written["device"], "fw1");
    assert_eq!(written["interfaces"].as_array().unwrap().len(), 2);
}
