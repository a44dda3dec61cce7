use dns_api::backend::{proteus::ProteusBackend, Backend, BackendError, BackendSession, EntityType};
use dns_api::config::BackendConfig;
use secrecy::Secret;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REST: &str = "/Services/REST/v1";
const AUTH: &str = "BAMAuthToken: abc123";

fn backend_config(server: &MockServer) -> BackendConfig {
    BackendConfig {
        url: server.uri(),
        username: "api".to_string(),
        password: Secret::new("secret".to_string()),
        view_id: 7,
        timeout_seconds: 5,
        accept_invalid_certs: false,
    }
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("{}/login", REST)))
        .and(query_param("username", "api"))
        .and(query_param("password", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            "Session Token-> BAMAuthToken: abc123 <- for User : api",
        ))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_logout(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("{}/logout", REST)))
        .and(header("Authorization", AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json("User api logged out"))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_session_token_is_sent_on_every_call() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_logout(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/getEntityById", REST)))
        .and(query_param("id", "12345"))
        .and(header("Authorization", AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 12345,
            "name": "foo.example.com",
            "type": "HostRecord",
            "properties": "addresses=192.168.1.23|"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = ProteusBackend::new().login(&backend_config(&server)).await.unwrap();
    let entity = session.get_entity_by_id(12345).await.unwrap();
    session.logout().await.unwrap();

    assert_eq!(entity.kind(), Some(EntityType::HostRecord));
    assert_eq!(entity.property("addresses").as_deref(), Some("192.168.1.23"));
}

#[tokio::test]
async fn test_placeholder_entity_is_not_found() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/getEntityById", REST)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 0,
            "name": null,
            "type": null,
            "properties": null
        })))
        .mount(&server)
        .await;

    let session = ProteusBackend::new().login(&backend_config(&server)).await.unwrap();
    let err = session.get_entity_by_id(99).await.unwrap_err();

    assert!(matches!(err, BackendError::NotFound(_)));
}

#[tokio::test]
async fn test_error_bodies_are_classified() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/delete", REST)))
        .and(query_param("objectId", "41"))
        .respond_with(ResponseTemplate::new(500).set_body_json("Object was not found"))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/delete", REST)))
        .and(query_param("objectId", "42"))
        .respond_with(ResponseTemplate::new(409).set_body_json("Object is in use"))
        .mount(&server)
        .await;

    let session = ProteusBackend::new().login(&backend_config(&server)).await.unwrap();

    assert!(matches!(session.delete(41).await, Err(BackendError::NotFound(_))));
    assert_eq!(
        session.delete(42).await,
        Err(BackendError::Status { status: 409, message: "Object is in use".to_string() })
    );
}

#[tokio::test]
async fn test_host_record_creation_arguments() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/addHostRecord", REST)))
        .and(query_param("viewId", "7"))
        .and(query_param("absoluteName", "foo.example.com"))
        .and(query_param("addresses", "192.168.1.23"))
        .and(query_param("ttl", "300"))
        .and(header("Authorization", AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(4242))
        .expect(1)
        .mount(&server)
        .await;

    let session = ProteusBackend::new().login(&backend_config(&server)).await.unwrap();
    let id = session
        .add_host_record(7, "foo.example.com", "192.168.1.23", 300, "")
        .await
        .unwrap();

    assert_eq!(id, 4242);
}

#[tokio::test]
async fn test_rejected_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/login", REST)))
        .respond_with(ResponseTemplate::new(401).set_body_json("Invalid username or password"))
        .mount(&server)
        .await;

    let err = ProteusBackend::new()
        .login(&backend_config(&server))
        .await
        .err()
        .expect("login should fail");

    assert!(matches!(err, BackendError::Login(_)));
}
