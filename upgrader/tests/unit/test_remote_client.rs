//! Device-control service client tests

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pan_os_upgrade::device::remote::RemoteDeviceClient;
use pan_os_upgrade::device::{ConnectionHandle, DeviceClient};
use pan_os_upgrade::errors::UpgradeError;
use pan_os_upgrade::http::client::HttpClient;
use pan_os_upgrade::storage::layout::StorageLayout;
use pan_os_upgrade::utils::sha256_hash;

use crate::common::device;

fn client(server: &MockServer, dir: &std::path::Path) -> RemoteDeviceClient {
    let http = HttpClient::new(&server.uri()).unwrap();
    RemoteDeviceClient::new(
        Arc::new(http),
        device("fw1"),
        StorageLayout::new(dir),
        Duration::from_millis(10),
    )
}

fn handle() -> ConnectionHandle {
    let mut handle = ConnectionHandle::new("fw1", "s-1");
    handle.token = Some(Arc::new(SecretString::from("tok".to_string())));
    handle
}

#[tokio::test]
async fn test_connect_then_authenticated_version() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/devices/fw1/session"))
        .and(body_partial_json(json!({"address": "192.0.2.10", "username": "admin"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_id": "s-1",
            "token": "tok"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/devices/fw1/version"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "10.1.3"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, dir.path());
    let handle = client.connect().await.unwrap();
    assert_eq!(handle.session_id, "s-1");
    assert_eq!(client.get_version(&handle).await.unwrap(), "10.1.3");
}

#[tokio::test]
async fn test_rejection_maps_to_operation_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/devices/fw1/software/10.2.8/download"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"error": "insufficient disk space"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/devices/fw1/software/10.2.8/install"))
        .respond_with(ResponseTemplate::new(503).set_body_string("device unreachable"))
        .mount(&server)
        .await;

    let client = client(&server, dir.path());

    let err = client.download_image(&handle(), "10.2.8").await.unwrap_err();
    match err {
        UpgradeError::DownloadError(msg) => assert_eq!(msg, "insufficient disk space"),
        other => panic!("unexpected error: {other:?}"),
    }

    // server-side trouble is a connectivity problem, not an install failure
    let err = client.install_image(&handle(), "10.2.8").await.unwrap_err();
    assert!(matches!(err, UpgradeError::ConnectivityError(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_backup_is_written_locally() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/devices/fw1/config/export"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"config": "<config/>"})))
        .mount(&server)
        .await;

    let client = client(&server, dir.path());
    let artifact = client.backup_config(&handle()).await.unwrap();

    let layout = StorageLayout::new(dir.path());
    assert!(artifact.path.starts_with(layout.backups_dir("fw1").path()));
    assert_eq!(std::fs::read_to_string(&artifact.path).unwrap(), "<config/>");
    assert_eq!(artifact.sha256, sha256_hash(b"<config/>"));
}

#[tokio::test]
async fn test_wait_for_ready_polls_status() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/devices/fw1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ready": false})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/devices/fw1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ready": true})))
        .mount(&server)
        .await;

    let client = client(&server, dir.path());
    assert_ok!(client.wait_for_ready(&handle(), Duration::from_secs(5)).await);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn test_wait_for_ready_times_out() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/devices/fw1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ready": false})))
        .mount(&server)
        .await;

    let client = client(&server, dir.path());
    let err = assert_err!(client.wait_for_ready(&handle(), Duration::from_millis(80)).await);
    assert!(matches!(err, UpgradeError::PostRebootTimeoutError(_)));
}

#[tokio::test]
async fn test_network_state() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/devices/fw1/network-state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "routes": [
                {"destination": "0.0.0.0/0", "gateway": "192.168.1.1", "interface": "ethernet1/1"}
            ],
            "interfaces": [
                {"name": "ethernet1/1", "status": "up", "ip": "192.168.1.10/24"}
            ],
            "sessions": {"total": 1500, "tcp": 1200, "udp": 300}
        })))
        .mount(&server)
        .await;

    let client = client(&server, dir.path());
    let state = client.collect_network_state(&handle()).await.unwrap();
    assert_eq!(state.routes.len(), 1);
    assert_eq!(state.routes[0].destination.to_string(), "0.0.0.0/0");
    assert_eq!(state.interfaces[0].status, "up");
    assert_eq!(state.sessions.total, 1500);
}

#[tokio::test]
async fn test_version_is_a_single_path_segment() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/devices/fw1/software/10.2%2F..%2F8/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, dir.path());
    assert_ok!(client.download_image(&handle(), "10.2/../8").await);
}
