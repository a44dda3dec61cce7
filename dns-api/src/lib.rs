pub mod auth;
pub mod backend;
pub mod config;
pub mod dtos;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod utils;

use axum::{
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use futures::future::BoxFuture;
use metrics_exporter_prometheus::PrometheusHandle;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::TokenAuthority;
use crate::backend::Backend;
use crate::config::{AccountConfig, AccountRegistry, Config};
use crate::gateway::{EntityGateway, GatewayError};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub accounts: Arc<AccountRegistry>,
    pub authority: Arc<TokenAuthority>,
    pub backend: Arc<dyn Backend>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn from_config(config: Config, backend: Arc<dyn Backend>) -> Result<Self, AppError> {
        let authority = TokenAuthority::from_config(&config.auth)?;
        let accounts = AccountRegistry::new(config.accounts.clone());

        Ok(Self {
            config: Arc::new(config),
            accounts: Arc::new(accounts),
            authority: Arc::new(authority),
            backend,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Run `operation` in a backend session for `account`; see
    /// [`gateway::with_gateway`].
    pub async fn with_gateway<T, F>(
        &self,
        account: Arc<AccountConfig>,
        operation: F,
    ) -> Result<T, GatewayError>
    where
        F: for<'g> FnOnce(&'g EntityGateway) -> BoxFuture<'g, Result<T, GatewayError>>,
    {
        gateway::with_gateway(self.backend.as_ref(), account, operation).await
    }
}

pub fn build_router(state: AppState) -> Router {
    use handlers::{entities, ips, macs, meta, networks, records, search, zones};

    let origins = &state.config.allowed_origins;
    let cors_origins = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|e| tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e))
                .ok()
        }))
    };

    let auth_header = state.authority.header().clone();

    Router::new()
        .route("/health", get(meta::health_check))
        .route("/metrics", get(meta::metrics))
        .route("/v1/dns/ping", get(meta::ping))
        .route("/v1/dns/version", get(meta::version))
        .route("/v1/dns", get(meta::list_accounts))
        .route("/v1/dns/", get(meta::list_accounts))
        .route("/v1/dns/:account/search", get(search::search))
        .route(
            "/v1/dns/:account/id/:id",
            get(entities::get_entity).delete(entities::delete_entity),
        )
        .route("/v1/dns/:account/zones", get(zones::list_zones))
        .route("/v1/dns/:account/zones/:id", get(zones::get_zone))
        .route("/v1/dns/:account/networks", get(networks::list_networks))
        .route("/v1/dns/:account/networks/:id", get(networks::get_network))
        .route(
            "/v1/dns/:account/records",
            get(records::list_records).post(records::create_record),
        )
        .route(
            "/v1/dns/:account/records/:id",
            get(records::get_record)
                .put(records::update_record)
                .delete(records::delete_record),
        )
        .route("/v1/dns/:account/ips", post(ips::assign_ip))
        .route("/v1/dns/:account/ips/cidrs", get(ips::list_cidrs))
        .route(
            "/v1/dns/:account/ips/:ip",
            get(ips::get_ip).put(ips::update_ip).delete(ips::delete_ip),
        )
        .route("/v1/dns/:account/macs", post(macs::create_mac))
        .route(
            "/v1/dns/:account/macs/:mac",
            get(macs::get_mac).put(macs::update_mac),
        )
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(cors_origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    auth_header,
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    HeaderName::from_static("x-request-id"),
                ]),
        )
}
