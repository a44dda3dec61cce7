//! Per-request session against one account's backend.
//!
//! [`with_gateway`] is the only way handlers reach the backend: it logs in,
//! runs the operation and logs out whatever the operation returned. If a
//! gateway is dropped while still holding its session (panic, cancelled
//! request), `Drop` hands the logout to a background task.

pub mod error;
pub mod resolver;

pub use error::GatewayError;
pub use resolver::{NetworkResolver, CANARY_PROBE_LIMIT};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::backend::{Backend, BackendSession, Entity, EntityType, IpAssignment};
use crate::config::AccountConfig;
use crate::dtos::{AssignIpRequest, CreateMacRequest, CreateRecordRequest, UpdateMacRequest};

pub const DEFAULT_TTL: u32 = 300;
pub const DEFAULT_LIMIT: u32 = 10;
const ASSIGN_ACTION: &str = "MAKE_STATIC";

/// Pagination window. The backend never returns more than 10 entries,
/// whatever `limit` asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    pub fn from_query(offset: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            offset: offset.unwrap_or(0),
            limit: limit.unwrap_or(DEFAULT_LIMIT),
        }
    }

    fn ensure_valid(&self) -> Result<(), GatewayError> {
        if self.limit == 0 {
            return Err(GatewayError::bad_request("limit must be a positive integer"));
        }
        Ok(())
    }
}

/// How external host records are looked up, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalHostSelector {
    ByName(String),
    ByKeyword(String),
    All,
}

impl ExternalHostSelector {
    pub fn from_query(name: Option<String>, keyword: Option<String>) -> Self {
        match (name, keyword) {
            (Some(name), _) => ExternalHostSelector::ByName(name),
            (None, Some(keyword)) => ExternalHostSelector::ByKeyword(keyword),
            (None, None) => ExternalHostSelector::All,
        }
    }
}

/// Record listing requested through `GET records`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordListing {
    Host { hint: Option<String> },
    Alias { hint: Option<String> },
    ExternalHost(ExternalHostSelector),
}

/// Result of a next-available-address assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedAddress {
    pub id: i64,
    #[serde(rename = "ip")]
    pub address: Option<String>,
    pub name: Option<String>,
}

fn hint_options(hint: Option<&str>) -> String {
    hint.map(|h| format!("hint={}", h)).unwrap_or_default()
}

pub struct EntityGateway {
    session: Option<Box<dyn BackendSession>>,
    account: Arc<AccountConfig>,
    configuration_id: OnceCell<i64>,
}

impl EntityGateway {
    /// Log in to the account's backend. Prefer [`with_gateway`], which
    /// also guarantees the logout.
    pub async fn open(backend: &dyn Backend, account: Arc<AccountConfig>) -> Result<Self, GatewayError> {
        match backend.login(&account.backend).await {
            Ok(session) => {
                metrics::counter!("dns_api_backend_sessions_total", "outcome" => "opened")
                    .increment(1);
                Ok(Self {
                    session: Some(session),
                    account,
                    configuration_id: OnceCell::new(),
                })
            }
            Err(e) => {
                metrics::counter!("dns_api_backend_sessions_total", "outcome" => "login_failed")
                    .increment(1);
                tracing::error!(account = %account.name, error = %e, "Backend login failed");
                Err(e.into())
            }
        }
    }

    pub async fn logout(mut self) -> Result<(), GatewayError> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        match session.logout().await {
            Ok(()) => {
                metrics::counter!("dns_api_backend_sessions_total", "outcome" => "closed")
                    .increment(1);
                Ok(())
            }
            Err(e) => {
                metrics::counter!("dns_api_backend_sessions_total", "outcome" => "logout_failed")
                    .increment(1);
                Err(e.into())
            }
        }
    }

    pub fn account(&self) -> &AccountConfig {
        &self.account
    }

    fn session(&self) -> Result<&dyn BackendSession, GatewayError> {
        self.session.as_deref().ok_or_else(|| GatewayError::Backend {
            status: None,
            message: "backend session already closed".to_string(),
        })
    }

    fn view_id(&self) -> i64 {
        self.account.backend.view_id
    }

    /// Id of the first backend configuration, fetched once per session.
    pub async fn configuration_id(&self) -> Result<i64, GatewayError> {
        self.configuration_id
            .get_or_try_init(|| async {
                let configurations = self
                    .session()?
                    .get_entities(0, EntityType::Configuration, 0, 1)
                    .await?;
                configurations
                    .first()
                    .map(|c| c.id)
                    .ok_or_else(|| GatewayError::Backend {
                        status: None,
                        message: "backend has no configuration".to_string(),
                    })
            })
            .await
            .copied()
    }

    /// Fetch by id; an entity whose type is not in `allowed` is reported
    /// as not found. An empty `allowed` accepts any type.
    pub async fn get_entity(&self, id: i64, allowed: &[EntityType]) -> Result<Entity, GatewayError> {
        let entity = self.session()?.get_entity_by_id(id).await?;
        if entity.is_placeholder() {
            return Err(GatewayError::NotFound);
        }
        if !allowed.is_empty() && !entity.kind().is_some_and(|kind| allowed.contains(&kind)) {
            tracing::debug!(
                entity_id = id,
                entity_type = ?entity.entity_type,
                "Entity type not served by this endpoint"
            );
            return Err(GatewayError::NotFound);
        }
        Ok(entity)
    }

    pub async fn parent_id(&self, id: i64) -> Result<i64, GatewayError> {
        Ok(self.session()?.get_parent(id).await?.id)
    }

    pub async fn list_zones(&self, page: Page, hint: Option<&str>) -> Result<Vec<Entity>, GatewayError> {
        page.ensure_valid()?;
        let configuration_id = self.configuration_id().await?;
        Ok(self
            .session()?
            .get_zones_by_hint(configuration_id, page.offset, page.limit, &hint_options(hint))
            .await?)
    }

    pub async fn list_networks(&self, page: Page, hint: Option<&str>) -> Result<Vec<Entity>, GatewayError> {
        page.ensure_valid()?;
        let configuration_id = self.configuration_id().await?;
        Ok(self
            .session()?
            .get_ip4_networks_by_hint(configuration_id, page.offset, page.limit, &hint_options(hint))
            .await?)
    }

    pub async fn list_host_records(&self, page: Page, hint: Option<&str>) -> Result<Vec<Entity>, GatewayError> {
        page.ensure_valid()?;
        Ok(self
            .session()?
            .get_host_records_by_hint(page.offset, page.limit, &hint_options(hint))
            .await?)
    }

    pub async fn list_alias_records(&self, page: Page, hint: Option<&str>) -> Result<Vec<Entity>, GatewayError> {
        page.ensure_valid()?;
        Ok(self
            .session()?
            .get_aliases_by_hint(page.offset, page.limit, &hint_options(hint))
            .await?)
    }

    pub async fn list_external_host_records(
        &self,
        page: Page,
        selector: &ExternalHostSelector,
    ) -> Result<Vec<Entity>, GatewayError> {
        page.ensure_valid()?;
        let session = self.session()?;
        let records = match selector {
            ExternalHostSelector::ByName(name) => vec![
                session
                    .get_entity_by_name(self.view_id(), name, EntityType::ExternalHost)
                    .await?,
            ],
            ExternalHostSelector::ByKeyword(keyword) => {
                session
                    .search_by_object_types(keyword, EntityType::ExternalHost, page.offset, page.limit)
                    .await?
            }
            ExternalHostSelector::All => {
                session
                    .get_entities(self.view_id(), EntityType::ExternalHost, page.offset, page.limit)
                    .await?
            }
        };
        Ok(records)
    }

    pub async fn list_records(&self, page: Page, listing: &RecordListing) -> Result<Vec<Entity>, GatewayError> {
        match listing {
            RecordListing::Host { hint } => self.list_host_records(page, hint.as_deref()).await,
            RecordListing::Alias { hint } => self.list_alias_records(page, hint.as_deref()).await,
            RecordListing::ExternalHost(selector) => {
                self.list_external_host_records(page, selector).await
            }
        }
    }

    /// Create an alias, external host or host record; returns the new id.
    pub async fn create_record(&self, request: &CreateRecordRequest) -> Result<i64, GatewayError> {
        let ttl = request.ttl.unwrap_or(DEFAULT_TTL);
        let properties = request.properties.as_deref().unwrap_or_default();
        let target = || {
            request.target.as_deref().ok_or_else(|| {
                GatewayError::bad_request(format!("target is required for {}", request.record_type))
            })
        };

        let session = self.session()?;
        let id = match request.record_type {
            EntityType::CnameRecord => {
                session
                    .add_alias_record(self.view_id(), &request.record, target()?, ttl, properties)
                    .await?
            }
            EntityType::ExternalHost => {
                session
                    .add_external_host_record(self.view_id(), &request.record, properties)
                    .await?
            }
            EntityType::HostRecord => {
                session
                    .add_host_record(self.view_id(), &request.record, target()?, ttl, properties)
                    .await?
            }
            other => {
                tracing::error!(record_type = %other, "Unexpected type in create_record");
                return Err(GatewayError::bad_request(format!("Bad type: {}", other)));
            }
        };

        tracing::info!(
            account = %self.account.name,
            record = %request.record,
            record_type = %request.record_type,
            entity_id = id,
            "Record created"
        );
        Ok(id)
    }

    /// The backend does not make deletes idempotent: a second delete of
    /// the same id is NotFound.
    pub async fn delete_entity(&self, id: i64) -> Result<(), GatewayError> {
        self.session()?.delete(id).await?;
        tracing::info!(account = %self.account.name, entity_id = id, "Entity deleted");
        Ok(())
    }

    pub async fn get_ip4_address(&self, address: &str) -> Result<Entity, GatewayError> {
        tracing::info!(address, "Looking up IPv4 address");
        let configuration_id = self.configuration_id().await?;
        let entity = self
            .session()?
            .get_ip4_address(configuration_id, address)
            .await?;
        if entity.entity_type.is_none() {
            return Err(GatewayError::NotFound);
        }
        Ok(entity)
    }

    pub async fn delete_ip4_address(&self, address: &str) -> Result<(), GatewayError> {
        let entity = self.get_ip4_address(address).await?;
        self.delete_entity(entity.id).await
    }

    /// Allocate the next free address in the requested network, resolving
    /// `cidr` to a network when no `network_id` is given.
    pub async fn assign_next_ip(&self, request: &AssignIpRequest) -> Result<AssignedAddress, GatewayError> {
        tracing::debug!(hostname = %request.hostname, "Assigning next available IP");

        let network_id = match (request.network_id, request.cidr.as_deref()) {
            (Some(id), _) => Some(id),
            (None, Some(cidr)) => NetworkResolver::new(self).resolve(cidr).await?,
            (None, None) => None,
        };
        let network_id = network_id
            .ok_or_else(|| GatewayError::bad_request("no network id could be determined"))?;

        let mut properties = format!("name={}", request.hostname);
        if let Some(extra) = &request.properties {
            properties.push('|');
            properties.push_str(extra);
        }

        let assignment = IpAssignment {
            configuration_id: self.configuration_id().await?,
            network_id,
            mac: request.mac.clone(),
            host_info: format!(
                "{},{},{},false",
                request.hostname,
                self.view_id(),
                request.reverse.map(|r| r.to_string()).unwrap_or_default()
            ),
            action: ASSIGN_ACTION.to_string(),
            properties,
        };

        let entity = self
            .session()?
            .assign_next_available_ip4_address(&assignment)
            .await?;

        let assigned = AssignedAddress {
            id: entity.id,
            address: entity.property("address"),
            name: entity.name,
        };
        tracing::info!(
            account = %self.account.name,
            network_id,
            entity_id = assigned.id,
            address = ?assigned.address,
            "IP address assigned"
        );
        Ok(assigned)
    }

    pub async fn create_mac(&self, request: &CreateMacRequest) -> Result<i64, GatewayError> {
        tracing::info!(mac = %request.mac, "Creating MAC address");
        let configuration_id = self.configuration_id().await?;
        let session = self.session()?;
        let id = session
            .add_mac_address(
                configuration_id,
                &request.mac,
                request.properties.as_deref().unwrap_or_default(),
            )
            .await?;
        if let Some(pool) = request.macpool {
            session
                .associate_mac_address_with_pool(configuration_id, &request.mac, pool)
                .await?;
        }
        Ok(id)
    }

    pub async fn get_mac(&self, mac: &str) -> Result<Entity, GatewayError> {
        tracing::info!(mac, "Looking up MAC address");
        let configuration_id = self.configuration_id().await?;
        let entity = self.session()?.get_mac_address(configuration_id, mac).await?;
        if entity.entity_type.is_none() {
            return Err(GatewayError::NotFound);
        }
        Ok(entity)
    }

    pub async fn update_mac(&self, mac: &str, request: &UpdateMacRequest) -> Result<(), GatewayError> {
        if request.is_empty() {
            return Err(GatewayError::bad_request("required parameter(s) not specified"));
        }
        tracing::info!(mac, "Updating MAC address");

        if let Some(pool) = request.macpool {
            let configuration_id = self.configuration_id().await?;
            self.session()?
                .associate_mac_address_with_pool(configuration_id, mac, pool)
                .await?;
        }
        if let Some(properties) = &request.properties {
            let entity = self.get_mac(mac).await?;
            self.session()?.update_properties(entity.id, properties).await?;
        }
        Ok(())
    }

    /// `filters` is a `|`-separated list of `key=value` terms.
    pub async fn custom_search(&self, filters: &str, entity_type: EntityType) -> Result<Vec<Entity>, GatewayError> {
        let filters: Vec<String> = filters
            .split('|')
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        tracing::debug!(entity_type = %entity_type, ?filters, "Custom search");
        Ok(self.session()?.custom_search(&filters, entity_type).await?)
    }
}

impl Drop for EntityGateway {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        metrics::counter!("dns_api_backend_sessions_total", "outcome" => "released_on_drop")
            .increment(1);
        let account = self.account.name.clone();
        tracing::error!(account = %account, "Backend session dropped without logout");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.logout().await {
                        tracing::error!(account = %account, error = %e, "Deferred backend logout failed");
                    }
                });
            }
            Err(_) => {
                tracing::error!(account = %account, "No runtime to release backend session");
            }
        }
    }
}

/// Run `operation` against a fresh session for `account`, logging out
/// afterwards on every path. A failed logout is logged and does not
/// replace the operation's own result.
///
/// ```ignore
/// let entity = with_gateway(backend, account, move |gateway| {
///     Box::pin(async move { gateway.get_entity(id, &EntityType::DEFAULT_LOOKUP).await })
/// })
/// .await?;
/// ```
pub async fn with_gateway<T, F>(
    backend: &dyn Backend,
    account: Arc<AccountConfig>,
    operation: F,
) -> Result<T, GatewayError>
where
    F: for<'g> FnOnce(&'g EntityGateway) -> BoxFuture<'g, Result<T, GatewayError>>,
{
    let gateway = EntityGateway::open(backend, account).await?;
    let result = operation(&gateway).await;

    let account = gateway.account.name.clone();
    if let Err(e) = gateway.logout().await {
        tracing::error!(account = %account, error = %e, "Backend logout failed");
    }

    result
}
