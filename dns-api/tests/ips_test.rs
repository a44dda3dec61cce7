mod common;

use axum::http::StatusCode;
use common::{body_json, body_text, test_config, TestApp, READ_WRITE_TOKEN};
use dns_api::backend::{mock::MockBackend, mock::MOCK_CONFIGURATION_ID, BackendError, Entity, EntityType};
use serde_json::json;
use std::io::Write;

const TOKEN: Option<&str> = Some(READ_WRITE_TOKEN);

fn network(backend: &MockBackend, cidr: &str) -> i64 {
    backend
        .insert(
            MOCK_CONFIGURATION_ID,
            Entity::new(0, "lab", EntityType::Ip4Network, &format!("CIDR={}|", cidr)),
        )
        .unwrap()
}

fn allocate(backend: &MockBackend, network_id: i64, address: &str) -> i64 {
    backend
        .insert(
            network_id,
            Entity::new(0, address, EntityType::Ip4Address, &format!("address={}|", address)),
        )
        .unwrap()
}

#[tokio::test]
async fn test_assign_ip_by_cidr() {
    let app = TestApp::new();
    let net = network(&app.backend, "192.168.1.0/24");
    allocate(&app.backend, net, "192.168.1.1");

    let response = app
        .post_json(
            "/v1/dns/bam-test/ips",
            TOKEN,
            json!({"hostname": "web01.example.com", "cidr": "192.168.1.0/24"}),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["ip"], "192.168.1.2");
    assert_eq!(body["name"], "web01.example.com");
    assert!(body["id"].as_i64().is_some());
    assert_eq!(app.sessions(), (1, 1));
}

#[tokio::test]
async fn test_assign_ip_by_network_id() {
    let app = TestApp::new();
    let net = network(&app.backend, "10.20.0.0/24");

    let response = app
        .post_json(
            "/v1/dns/bam-test/ips",
            TOKEN,
            json!({"hostname": "db01.example.com", "network_id": net, "mac": "aa:bb:cc:dd:ee:ff"}),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["ip"], "10.20.0.1");
    assert!(!app.backend.calls().iter().any(|c| c.starts_with("get_ip4_address")));
}

#[tokio::test]
async fn test_assign_ip_without_resolvable_network_is_bad_request() {
    let app = TestApp::new();
    network(&app.backend, "172.16.0.0/24");

    let response = app
        .post_json(
            "/v1/dns/bam-test/ips",
            TOKEN,
            json!({"hostname": "web01.example.com", "cidr": "172.16.0.0/24"}),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Bad request: no network id could be determined"
    );
    assert_eq!(app.sessions(), (1, 1));
}

#[tokio::test]
async fn test_assign_ip_requires_network_source() {
    let app = TestApp::new();

    let response = app
        .post_json("/v1/dns/bam-test/ips", TOKEN, json!({"hostname": "web01.example.com"}))
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.sessions(), (0, 0));
}

#[tokio::test]
async fn test_assign_ip_propagates_backend_faults() {
    let app = TestApp::new();
    app.backend
        .fail_on(
            "get_ip4_address",
            BackendError::Status { status: 502, message: "proxy error".into() },
        )
        .unwrap();

    let response = app
        .post_json(
            "/v1/dns/bam-test/ips",
            TOKEN,
            json!({"hostname": "web01.example.com", "cidr": "10.0.0.0/24"}),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(app.sessions(), (1, 1));
}

#[tokio::test]
async fn test_get_and_delete_ip_address() {
    let app = TestApp::new();
    let net = network(&app.backend, "10.0.0.0/24");
    let id = allocate(&app.backend, net, "10.0.0.5");

    let response = app.get("/v1/dns/bam-test/ips/10.0.0.5", TOKEN).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], id);

    let response = app.get("/v1/dns/bam-test/ips/10.0.0.6", TOKEN).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.delete("/v1/dns/bam-test/ips/10.0.0.5", TOKEN).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(app.backend.entity(id).is_none());

    let response = app.delete("/v1/dns/bam-test/ips/10.0.0.5", TOKEN).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert_eq!(app.sessions(), (4, 4));
}

#[tokio::test]
async fn test_ip_update_is_not_implemented() {
    let app = TestApp::new();

    let response = app
        .put_json("/v1/dns/bam-test/ips/1234", TOKEN, json!({"hostname": "x"}))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_cidr_file_contents() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "10.0.0.0/24\n192.168.1.0/24\n").unwrap();
    let path = file.path().to_string_lossy().into_owned();
    let app = TestApp::with_config(test_config(Some(&path)));

    let response = app.get("/v1/dns/bam-test/ips/cidrs", TOKEN).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "10.0.0.0/24\n192.168.1.0/24\n");
    assert_eq!(app.sessions(), (0, 0));
}

#[tokio::test]
async fn test_cidr_file_not_defined() {
    let app = TestApp::new();

    let response = app.get("/v1/dns/bam-test/ips/cidrs", TOKEN).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Configuration error");
    assert_eq!(body["details"], "CIDR file not defined");
}
