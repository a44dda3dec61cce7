//! BlueCat Address Manager (Proteus) REST client.
//!
//! Speaks the `/Services/REST/v1` API: a `login` call returns a session
//! token that is sent as the `Authorization` header on every later call
//! until `logout`.

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client, Method, RequestBuilder};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use service_core::observability::traced;
use std::time::Duration;

use super::{Backend, BackendError, BackendSession, Entity, EntityType, IpAssignment};
use crate::config::BackendConfig;

const REST_PATH: &str = "Services/REST/v1";

/// Opens REST sessions against the account's Address Manager.
#[derive(Debug, Clone, Default)]
pub struct ProteusBackend;

impl ProteusBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Backend for ProteusBackend {
    async fn login(&self, config: &BackendConfig) -> Result<Box<dyn BackendSession>, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let base_url = format!("{}/{}", config.url.trim_end_matches('/'), REST_PATH);

        let response = traced(client.get(format!("{}/login", base_url)))
            .query(&[
                ("username", config.username.as_str()),
                ("password", config.password.expose_secret().as_str()),
            ])
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::error!(status = %status, url = %base_url, "Backend login rejected");
            return Err(BackendError::Login(format!("{}: {}", status, unquote(&body))));
        }

        let authorization = parse_session_token(&body)
            .ok_or_else(|| BackendError::Login("no session token in login response".to_string()))?;

        tracing::debug!(url = %base_url, username = %config.username, "Logged in to backend");

        Ok(Box::new(ProteusSession {
            client,
            base_url,
            authorization,
        }))
    }
}

/// Login answers `"Session Token-> BAMAuthToken: abc <- for User : api"`;
/// the part between the arrows is the `Authorization` header value.
fn parse_session_token(body: &str) -> Option<String> {
    let text = unquote(body);
    let start = text.find("->")? + 2;
    let end = start + text[start..].find("<-")?;
    let token = text[start..end].trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Many responses are bare JSON strings.
fn unquote(body: &str) -> String {
    serde_json::from_str::<String>(body).unwrap_or_else(|_| body.trim().to_string())
}

fn classify_failure(status: u16, body: &str) -> BackendError {
    let message = unquote(body);
    let lower = message.to_ascii_lowercase();
    if lower.contains("not found") || lower.contains("does not exist") {
        BackendError::NotFound(message)
    } else {
        BackendError::Status { status, message }
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, BackendError> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| BackendError::Decode(format!("{}: {}", e, body)))
}

struct ProteusSession {
    client: Client,
    base_url: String,
    authorization: String,
}

type Query<'a> = [(&'a str, String)];

impl ProteusSession {
    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        traced(
            self.client
                .request(method, format!("{}/{}", self.base_url, endpoint)),
        )
        .header(AUTHORIZATION, &self.authorization)
    }

    async fn send(&self, request: RequestBuilder, endpoint: &str) -> Result<String, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        tracing::debug!(endpoint, status = %status, "Backend response");

        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_failure(status.as_u16(), &body))
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &Query<'_>,
    ) -> Result<T, BackendError> {
        let body = self
            .send(self.request(method, endpoint).query(query), endpoint)
            .await?;
        decode(&body)
    }

    async fn call_unit(&self, method: Method, endpoint: &str, query: &Query<'_>) -> Result<(), BackendError> {
        self.send(self.request(method, endpoint).query(query), endpoint)
            .await
            .map(|_| ())
    }

    /// Single-entity lookups; a null or id-0 answer is a miss.
    async fn entity(&self, endpoint: &str, query: &Query<'_>, what: String) -> Result<Entity, BackendError> {
        match self.call::<Option<Entity>>(Method::GET, endpoint, query).await? {
            Some(entity) if entity.id != 0 => Ok(entity),
            _ => Err(BackendError::NotFound(what)),
        }
    }

    /// Lookups the backend answers with a placeholder entity when absent.
    async fn entity_or_placeholder(&self, endpoint: &str, query: &Query<'_>) -> Result<Entity, BackendError> {
        Ok(self
            .call::<Option<Entity>>(Method::GET, endpoint, query)
            .await?
            .unwrap_or_default())
    }

    async fn entities(&self, endpoint: &str, query: &Query<'_>) -> Result<Vec<Entity>, BackendError> {
        Ok(self
            .call::<Option<Vec<Entity>>>(Method::GET, endpoint, query)
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl BackendSession for ProteusSession {
    async fn logout(&self) -> Result<(), BackendError> {
        self.call_unit(Method::GET, "logout", &[]).await
    }

    async fn get_entity_by_id(&self, id: i64) -> Result<Entity, BackendError> {
        self.entity("getEntityById", &[("id", id.to_string())], format!("id {}", id))
            .await
    }

    async fn get_entity_by_name(
        &self,
        parent_id: i64,
        name: &str,
        entity_type: EntityType,
    ) -> Result<Entity, BackendError> {
        self.entity(
            "getEntityByName",
            &[
                ("parentId", parent_id.to_string()),
                ("name", name.to_string()),
                ("type", entity_type.to_string()),
            ],
            format!("{} {}", entity_type, name),
        )
        .await
    }

    async fn get_entities(
        &self,
        parent_id: i64,
        entity_type: EntityType,
        start: u32,
        count: u32,
    ) -> Result<Vec<Entity>, BackendError> {
        self.entities(
            "getEntities",
            &[
                ("parentId", parent_id.to_string()),
                ("type", entity_type.to_string()),
                ("start", start.to_string()),
                ("count", count.to_string()),
            ],
        )
        .await
    }

    async fn search_by_object_types(
        &self,
        keyword: &str,
        entity_type: EntityType,
        start: u32,
        count: u32,
    ) -> Result<Vec<Entity>, BackendError> {
        self.entities(
            "searchByObjectTypes",
            &[
                ("keyword", keyword.to_string()),
                ("types", entity_type.to_string()),
                ("start", start.to_string()),
                ("count", count.to_string()),
            ],
        )
        .await
    }

    async fn get_parent(&self, id: i64) -> Result<Entity, BackendError> {
        self.entity(
            "getParent",
            &[("entityId", id.to_string())],
            format!("parent of {}", id),
        )
        .await
    }

    async fn get_zones_by_hint(
        &self,
        container_id: i64,
        start: u32,
        count: u32,
        options: &str,
    ) -> Result<Vec<Entity>, BackendError> {
        self.entities(
            "getZonesByHint",
            &[
                ("containerId", container_id.to_string()),
                ("start", start.to_string()),
                ("count", count.to_string()),
                ("options", options.to_string()),
            ],
        )
        .await
    }

    async fn get_ip4_networks_by_hint(
        &self,
        container_id: i64,
        start: u32,
        count: u32,
        options: &str,
    ) -> Result<Vec<Entity>, BackendError> {
        self.entities(
            "getIP4NetworksByHint",
            &[
                ("containerId", container_id.to_string()),
                ("start", start.to_string()),
                ("count", count.to_string()),
                ("options", options.to_string()),
            ],
        )
        .await
    }

    async fn get_host_records_by_hint(
        &self,
        start: u32,
        count: u32,
        options: &str,
    ) -> Result<Vec<Entity>, BackendError> {
        self.entities(
            "getHostRecordsByHint",
            &[
                ("start", start.to_string()),
                ("count", count.to_string()),
                ("options", options.to_string()),
            ],
        )
        .await
    }

    async fn get_aliases_by_hint(
        &self,
        start: u32,
        count: u32,
        options: &str,
    ) -> Result<Vec<Entity>, BackendError> {
        self.entities(
            "getAliasesByHint",
            &[
                ("start", start.to_string()),
                ("count", count.to_string()),
                ("options", options.to_string()),
            ],
        )
        .await
    }

    async fn add_alias_record(
        &self,
        view_id: i64,
        absolute_name: &str,
        linked_record_name: &str,
        ttl: u32,
        properties: &str,
    ) -> Result<i64, BackendError> {
        self.call(
            Method::POST,
            "addAliasRecord",
            &[
                ("viewId", view_id.to_string()),
                ("absoluteName", absolute_name.to_string()),
                ("linkedRecordName", linked_record_name.to_string()),
                ("ttl", ttl.to_string()),
                ("properties", properties.to_string()),
            ],
        )
        .await
    }

    async fn add_external_host_record(
        &self,
        view_id: i64,
        name: &str,
        properties: &str,
    ) -> Result<i64, BackendError> {
        self.call(
            Method::POST,
            "addExternalHostRecord",
            &[
                ("viewId", view_id.to_string()),
                ("name", name.to_string()),
                ("properties", properties.to_string()),
            ],
        )
        .await
    }

    async fn add_host_record(
        &self,
        view_id: i64,
        absolute_name: &str,
        addresses: &str,
        ttl: u32,
        properties: &str,
    ) -> Result<i64, BackendError> {
        self.call(
            Method::POST,
            "addHostRecord",
            &[
                ("viewId", view_id.to_string()),
                ("absoluteName", absolute_name.to_string()),
                ("addresses", addresses.to_string()),
                ("ttl", ttl.to_string()),
                ("properties", properties.to_string()),
            ],
        )
        .await
    }

    async fn delete(&self, id: i64) -> Result<(), BackendError> {
        self.call_unit(Method::DELETE, "delete", &[("objectId", id.to_string())])
            .await
    }

    async fn get_ip4_address(
        &self,
        container_id: i64,
        address: &str,
    ) -> Result<Entity, BackendError> {
        self.entity_or_placeholder(
            "getIP4Address",
            &[
                ("containerId", container_id.to_string()),
                ("address", address.to_string()),
            ],
        )
        .await
    }

    async fn assign_next_available_ip4_address(
        &self,
        assignment: &IpAssignment,
    ) -> Result<Entity, BackendError> {
        let entity: Option<Entity> = self
            .call(
                Method::POST,
                "assignNextAvailableIP4Address",
                &[
                    ("configurationId", assignment.configuration_id.to_string()),
                    ("parentId", assignment.network_id.to_string()),
                    ("macAddress", assignment.mac.clone().unwrap_or_default()),
                    ("hostInfo", assignment.host_info.clone()),
                    ("action", assignment.action.clone()),
                    ("properties", assignment.properties.clone()),
                ],
            )
            .await?;

        entity.ok_or_else(|| BackendError::Decode("empty address assignment response".to_string()))
    }

    async fn add_mac_address(
        &self,
        configuration_id: i64,
        mac: &str,
        properties: &str,
    ) -> Result<i64, BackendError> {
        self.call(
            Method::POST,
            "addMACAddress",
            &[
                ("configurationId", configuration_id.to_string()),
                ("macAddress", mac.to_string()),
                ("properties", properties.to_string()),
            ],
        )
        .await
    }

    async fn associate_mac_address_with_pool(
        &self,
        configuration_id: i64,
        mac: &str,
        pool_id: i64,
    ) -> Result<(), BackendError> {
        self.call_unit(
            Method::PUT,
            "associateMACAddressWithPool",
            &[
                ("configurationId", configuration_id.to_string()),
                ("macAddress", mac.to_string()),
                ("poolId", pool_id.to_string()),
            ],
        )
        .await
    }

    async fn get_mac_address(
        &self,
        configuration_id: i64,
        mac: &str,
    ) -> Result<Entity, BackendError> {
        self.entity_or_placeholder(
            "getMACAddress",
            &[
                ("configurationId", configuration_id.to_string()),
                ("macAddress", mac.to_string()),
            ],
        )
        .await
    }

    async fn update_properties(&self, id: i64, properties: &str) -> Result<(), BackendError> {
        // `update` replaces the whole entity, so start from the stored copy.
        let mut entity = self.get_entity_by_id(id).await?;
        entity.properties = Some(properties.to_string());

        self.send(self.request(Method::PUT, "update").json(&entity), "update")
            .await
            .map(|_| ())
    }

    async fn custom_search(
        &self,
        filters: &[String],
        entity_type: EntityType,
    ) -> Result<Vec<Entity>, BackendError> {
        let mut query: Vec<(&str, String)> = filters
            .iter()
            .map(|filter| ("filters", filter.clone()))
            .collect();
        query.push(("type", entity_type.to_string()));
        query.push(("options", String::new()));
        query.push(("start", "0".to_string()));
        query.push(("count", super::MAX_PAGE_SIZE.to_string()));

        self.entities("customSearch", &query).await
    }
}
