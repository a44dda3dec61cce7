mod common;

use axum::http::StatusCode;
use common::{body_json, TestApp, READ_WRITE_TOKEN};
use serde_json::json;

const TOKEN: Option<&str> = Some(READ_WRITE_TOKEN);
const MAC: &str = "aa:bb:cc:dd:ee:ff";

async fn create(app: &TestApp, body: serde_json::Value) -> axum::http::Response<axum::body::Body> {
    app.post_json("/v1/dns/bam-test/macs", TOKEN, body).await
}

#[tokio::test]
async fn test_create_mac_with_pool() {
    let app = TestApp::new();

    let response = create(&app, json!({"mac": MAC, "macpool": 55, "properties": "owner=netops|"})).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let id = body_json(response).await["id"].as_i64().expect("numeric id");
    assert!(app.backend.entity(id).is_some());
    assert!(app
        .backend
        .calls()
        .contains(&format!("associate_mac_address_with_pool(1, {}, 55)", MAC)));
    assert_eq!(app.sessions(), (1, 1));
}

#[tokio::test]
async fn test_duplicate_mac_is_conflict() {
    let app = TestApp::new();

    assert_eq!(create(&app, json!({"mac": MAC})).await.status(), StatusCode::CREATED);
    let response = create(&app, json!({"mac": MAC})).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "Backend error");
    assert_eq!(app.sessions(), (2, 2));
}

#[tokio::test]
async fn test_get_mac() {
    let app = TestApp::new();
    create(&app, json!({"mac": MAC})).await;

    let response = app.get(&format!("/v1/dns/bam-test/macs/{}", MAC), TOKEN).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["name"], MAC);
    assert_eq!(body["type"], "MACAddress");

    let response = app.get("/v1/dns/bam-test/macs/00:00:00:00:00:01", TOKEN).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_mac_requires_a_field() {
    let app = TestApp::new();
    create(&app, json!({"mac": MAC})).await;

    let response = app
        .put_json(&format!("/v1/dns/bam-test/macs/{}", MAC), TOKEN, json!({}))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.sessions(), (1, 1));
}

#[tokio::test]
async fn test_update_mac_pool_and_properties() {
    let app = TestApp::new();
    let response = create(&app, json!({"mac": MAC})).await;
    let id = body_json(response).await["id"].as_i64().expect("numeric id");

    let response = app
        .put_json(
            &format!("/v1/dns/bam-test/macs/{}", MAC),
            TOKEN,
            json!({"macpool": 77, "properties": "owner=dev|"}),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let calls = app.backend.calls();
    assert!(calls.contains(&format!("associate_mac_address_with_pool(1, {}, 77)", MAC)));
    assert!(calls.contains(&format!(r#"update_properties({}, "owner=dev|")"#, id)));
    assert_eq!(app.sessions(), (2, 2));
}

#[tokio::test]
async fn test_mac_body_validation() {
    let app = TestApp::new();

    let response = create(&app, json!({"macpool": 3})).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = create(&app, json!({"mac": ""})).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(app.sessions(), (0, 0));
}
