#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use dns_api::{
    backend::mock::MockBackend,
    build_router,
    config::Config,
    AppState,
};
use serde_json::{json, Value};
use service_core::utils::constant_time::sha256_hex;
use std::sync::Arc;
use tower::ServiceExt;

pub const READ_WRITE_TOKEN: &str = "rw-token-for-tests";
pub const READ_ONLY_TOKEN: &str = "ro-token-for-tests";
pub const VIEW_ID: i64 = 7;

pub fn test_config(cidr_file: Option<&str>) -> Config {
    serde_json::from_value(json!({
        "port": 8080,
        "auth": {
            "scheme": "digest_table",
            "tokens": [
                {
                    "token": sha256_hex(READ_WRITE_TOKEN),
                    "actions": ["GET", "POST", "PUT", "DELETE"]
                },
                { "token": sha256_hex(READ_ONLY_TOKEN), "actions": ["GET"] }
            ]
        },
        "accounts": [
            {
                "name": "bam-test",
                "backend": {
                    "url": "http://bam.invalid",
                    "username": "api",
                    "password": "secret",
                    "view_id": VIEW_ID
                },
                "cidr_file": cidr_file
            },
            {
                "name": "bam-lab",
                "backend": {
                    "url": "http://lab.invalid",
                    "username": "api",
                    "password": "secret",
                    "view_id": 9
                }
            }
        ]
    }))
    .expect("test config should deserialize")
}

pub struct TestApp {
    pub router: Router,
    pub backend: MockBackend,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config(None))
    }

    pub fn with_config(config: Config) -> Self {
        let backend = MockBackend::new();
        let state = AppState::from_config(config, Arc::new(backend.clone()))
            .expect("state should build");
        Self {
            router: build_router(state),
            backend,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        self.send(request("GET", uri, token, None)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        self.send(request("DELETE", uri, token, None)).await
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> Response<Body> {
        self.send(request("POST", uri, token, Some(body.to_string()))).await
    }

    pub async fn put_json(&self, uri: &str, token: Option<&str>, body: Value) -> Response<Body> {
        self.send(request("PUT", uri, token, Some(body.to_string()))).await
    }

    pub fn sessions(&self) -> (u64, u64) {
        (self.backend.logins(), self.backend.logouts())
    }
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<String>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("X-Auth-Token", token);
    }
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    builder
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .expect("request should build")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    String::from_utf8(bytes.to_vec()).expect("body should be UTF-8")
}
