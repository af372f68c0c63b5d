//! End-to-end scenarios against a real [`Runner`] bound to ephemeral ports (spec §8).

use std::net::{SocketAddr, TcpListener as StdTcpListener};

use dispatch_core::snapshot::ConfigSnapshot;
use dispatch_services::coordinator::SubmitError;
use dispatchd::runner::Runner;

fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn snapshot(version: &str, port: u16, echo_response: &str) -> ConfigSnapshot {
    let raw = serde_json::json!({
        "version": version,
        "listeners": [{"id": "L1", "address": format!("127.0.0.1:{port}"), "endpoint_id": "E1"}],
        "endpoints": [{"id": "E1", "routes": [
            {"app_id": "echo", "condition": {"kind": "HTTPPath", "path": "/"}, "static_data": {}}
        ]}],
        "apps": [{"id": "echo", "type": "echo", "response": echo_response}]
    });
    serde_json::from_value(raw).unwrap()
}

async fn get(addr: SocketAddr) -> reqwest::Response {
    reqwest::get(format!("http://{addr}/")).await.unwrap()
}

/// Scenario A: basic echo.
#[tokio::test]
async fn scenario_a_basic_echo() {
    let port = free_port();
    let runner = Runner::new();
    runner.submit(snapshot("v1", port, "hello")).await.unwrap();

    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let resp = get(addr).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(resp.text().await.unwrap(), "hello");

    runner.shutdown().await;
}

/// Scenario B: hot route swap — a GET strictly after `submit` returns sees the new response.
#[tokio::test]
async fn scenario_b_hot_swap() {
    let port = free_port();
    let runner = Runner::new();
    runner.submit(snapshot("v1", port, "hello")).await.unwrap();

    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    assert_eq!(get(addr).await.text().await.unwrap(), "hello");

    runner.submit(snapshot("v2", port, "world")).await.unwrap();
    assert_eq!(get(addr).await.text().await.unwrap(), "world");

    runner.shutdown().await;
}

/// Scenario C: adding a second listener bound to the same endpoint serves identically;
/// removing it later leaves the first listener untouched.
#[tokio::test]
async fn scenario_c_listener_add_and_remove() {
    let port1 = free_port();
    let port2 = free_port();
    let runner = Runner::new();
    runner.submit(snapshot("v1", port1, "hello")).await.unwrap();

    let raw = serde_json::json!({
        "version": "v2",
        "listeners": [
            {"id": "L1", "address": format!("127.0.0.1:{port1}"), "endpoint_id": "E1"},
            {"id": "L2", "address": format!("127.0.0.1:{port2}"), "endpoint_id": "E1"},
        ],
        "endpoints": [{"id": "E1", "routes": [
            {"app_id": "echo", "condition": {"kind": "HTTPPath", "path": "/"}, "static_data": {}}
        ]}],
        "apps": [{"id": "echo", "type": "echo", "response": "hello"}]
    });
    runner.submit(serde_json::from_value(raw).unwrap()).await.unwrap();

    let addr1: SocketAddr = format!("127.0.0.1:{port1}").parse().unwrap();
    let addr2: SocketAddr = format!("127.0.0.1:{port2}").parse().unwrap();
    assert_eq!(get(addr1).await.text().await.unwrap(), "hello");
    assert_eq!(get(addr2).await.text().await.unwrap(), "hello");

    runner.submit(snapshot("v3", port1, "hello")).await.unwrap();
    assert_eq!(get(addr1).await.text().await.unwrap(), "hello");
    assert!(reqwest::get(format!("http://{addr2}/")).await.is_err());

    runner.shutdown().await;
}

/// Scenario D: a listener referencing an endpoint missing from the same snapshot is
/// rejected as `ConfigInvalid` before any participant runs, leaving prior state untouched.
#[tokio::test]
async fn scenario_d_prepare_failure_is_rejected() {
    let port = free_port();
    let runner = Runner::new();
    runner.submit(snapshot("v1", port, "hello")).await.unwrap();

    let raw = serde_json::json!({
        "version": "v2",
        "listeners": [{"id": "L1", "address": "127.0.0.1:1", "endpoint_id": "E_missing"}],
        "endpoints": [{"id": "E1", "routes": []}],
        "apps": []
    });
    let bad: ConfigSnapshot = serde_json::from_value(raw).unwrap();
    let err = runner.submit(bad).await.unwrap_err();
    assert!(matches!(err, SubmitError::ConfigInvalid(_)));

    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    assert_eq!(get(addr).await.text().await.unwrap(), "hello");

    runner.shutdown().await;
}

/// Scenario F: an endpoint whose only route references an unknown app applies successfully
/// and falls through to 404.
#[tokio::test]
async fn scenario_f_unknown_app_falls_through_to_404() {
    let port = free_port();
    let raw = serde_json::json!({
        "version": "v1",
        "listeners": [{"id": "L1", "address": format!("127.0.0.1:{port}"), "endpoint_id": "E1"}],
        "endpoints": [{"id": "E1", "routes": [
            {"app_id": "missing", "condition": {"kind": "HTTPPath", "path": "/"}, "static_data": {}}
        ]}],
        "apps": []
    });
    let runner = Runner::new();
    runner.submit(serde_json::from_value(raw).unwrap()).await.unwrap();

    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let resp = get(addr).await;
    assert_eq!(resp.status(), 404);

    runner.shutdown().await;
}
