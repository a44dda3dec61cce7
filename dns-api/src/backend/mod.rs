//! Backend inventory store abstraction.
//!
//! The gateway talks to the IPAM system of record through [`Backend`]
//! (login) and [`BackendSession`] (everything a logged-in session can do).
//! [`proteus::ProteusBackend`] speaks the Address Manager REST API;
//! [`mock::MockBackend`] is an in-memory store used by tests.

pub mod mock;
pub mod proteus;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::BackendConfig;

/// Largest page the backend will return, whatever `count` is requested.
pub const MAX_PAGE_SIZE: u32 = 10;

/// Error type for backend client operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Backend login failed: {0}")]
    Login(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Unexpected backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Status code reported by the backend itself, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Entity types the gateway knows by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "GenericRecord")]
    GenericRecord,
    #[serde(rename = "ExternalHostRecord")]
    ExternalHost,
    #[serde(rename = "HostRecord")]
    HostRecord,
    #[serde(rename = "MXRecord")]
    MxRecord,
    #[serde(rename = "TXTRecord")]
    TxtRecord,
    #[serde(rename = "AliasRecord")]
    CnameRecord,
    #[serde(rename = "HINFORecord")]
    HinfoRecord,
    #[serde(rename = "SRVRecord")]
    SrvRecord,
    #[serde(rename = "IP4Address")]
    Ip4Address,
    #[serde(rename = "MACAddress")]
    MacAddress,
    #[serde(rename = "Zone")]
    Zone,
    #[serde(rename = "IP4Network")]
    Ip4Network,
    #[serde(rename = "IP4Block")]
    Ip4Block,
    #[serde(rename = "MACPool")]
    MacPool,
    #[serde(rename = "View")]
    View,
    #[serde(rename = "Configuration")]
    Configuration,
}

impl EntityType {
    pub const ALL: [EntityType; 16] = [
        EntityType::GenericRecord,
        EntityType::ExternalHost,
        EntityType::HostRecord,
        EntityType::MxRecord,
        EntityType::TxtRecord,
        EntityType::CnameRecord,
        EntityType::HinfoRecord,
        EntityType::SrvRecord,
        EntityType::Ip4Address,
        EntityType::MacAddress,
        EntityType::Zone,
        EntityType::Ip4Network,
        EntityType::Ip4Block,
        EntityType::MacPool,
        EntityType::View,
        EntityType::Configuration,
    ];

    /// Types served by the generic by-id lookups (`/id/:id`, `/records/:id`).
    pub const DEFAULT_LOOKUP: [EntityType; 10] = [
        EntityType::GenericRecord,
        EntityType::ExternalHost,
        EntityType::HostRecord,
        EntityType::MxRecord,
        EntityType::TxtRecord,
        EntityType::CnameRecord,
        EntityType::HinfoRecord,
        EntityType::SrvRecord,
        EntityType::Ip4Address,
        EntityType::MacAddress,
    ];

    /// Wire name used by the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::GenericRecord => "GenericRecord",
            EntityType::ExternalHost => "ExternalHostRecord",
            EntityType::HostRecord => "HostRecord",
            EntityType::MxRecord => "MXRecord",
            EntityType::TxtRecord => "TXTRecord",
            EntityType::CnameRecord => "AliasRecord",
            EntityType::HinfoRecord => "HINFORecord",
            EntityType::SrvRecord => "SRVRecord",
            EntityType::Ip4Address => "IP4Address",
            EntityType::MacAddress => "MACAddress",
            EntityType::Zone => "Zone",
            EntityType::Ip4Network => "IP4Network",
            EntityType::Ip4Block => "IP4Block",
            EntityType::MacPool => "MACPool",
            EntityType::View => "View",
            EntityType::Configuration => "Configuration",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown entity type: {}", s))
    }
}

/// An object as returned by the backend.
///
/// `type` is kept as the raw string so that entities of types this gateway
/// does not model still round-trip to callers untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub properties: Option<String>,
}

impl Entity {
    pub fn new(id: i64, name: impl Into<String>, entity_type: EntityType, properties: &str) -> Self {
        Self {
            id,
            name: Some(name.into()),
            entity_type: Some(entity_type.as_str().to_string()),
            properties: Some(properties.to_string()),
        }
    }

    /// The backend answers some lookups with a placeholder instead of an
    /// error: id 0 and no type.
    pub fn is_placeholder(&self) -> bool {
        self.id == 0 || self.entity_type.is_none()
    }

    pub fn kind(&self) -> Option<EntityType> {
        self.entity_type.as_deref().and_then(|t| t.parse().ok())
    }

    pub fn property(&self, key: &str) -> Option<String> {
        self.properties
            .as_deref()
            .map(parse_properties)
            .and_then(|mut bag| bag.remove(key))
    }
}

/// Split a `key=value|key=value|` property bag.
pub fn parse_properties(raw: &str) -> BTreeMap<String, String> {
    raw.split('|')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Arguments of the backend's next-available-address allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct IpAssignment {
    pub configuration_id: i64,
    pub network_id: i64,
    pub mac: Option<String>,
    pub host_info: String,
    pub action: String,
    pub properties: String,
}

/// Opens sessions against one backend account.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn login(&self, config: &BackendConfig) -> Result<Box<dyn BackendSession>, BackendError>;
}

/// A logged-in connection to the backend store.
///
/// Implementations report a missing entity as [`BackendError::NotFound`]
/// where the backend signals one; placeholder answers are passed through.
#[async_trait]
pub trait BackendSession: Send + Sync {
    async fn logout(&self) -> Result<(), BackendError>;

    async fn get_entity_by_id(&self, id: i64) -> Result<Entity, BackendError>;

    async fn get_entity_by_name(
        &self,
        parent_id: i64,
        name: &str,
        entity_type: EntityType,
    ) -> Result<Entity, BackendError>;

    async fn get_entities(
        &self,
        parent_id: i64,
        entity_type: EntityType,
        start: u32,
        count: u32,
    ) -> Result<Vec<Entity>, BackendError>;

    async fn search_by_object_types(
        &self,
        keyword: &str,
        entity_type: EntityType,
        start: u32,
        count: u32,
    ) -> Result<Vec<Entity>, BackendError>;

    async fn get_parent(&self, id: i64) -> Result<Entity, BackendError>;

    async fn get_zones_by_hint(
        &self,
        container_id: i64,
        start: u32,
        count: u32,
        options: &str,
    ) -> Result<Vec<Entity>, BackendError>;

    async fn get_ip4_networks_by_hint(
        &self,
        container_id: i64,
        start: u32,
        count: u32,
        options: &str,
    ) -> Result<Vec<Entity>, BackendError>;

    async fn get_host_records_by_hint(
        &self,
        start: u32,
        count: u32,
        options: &str,
    ) -> Result<Vec<Entity>, BackendError>;

    async fn get_aliases_by_hint(
        &self,
        start: u32,
        count: u32,
        options: &str,
    ) -> Result<Vec<Entity>, BackendError>;

    async fn add_alias_record(
        &self,
        view_id: i64,
        absolute_name: &str,
        linked_record_name: &str,
        ttl: u32,
        properties: &str,
    ) -> Result<i64, BackendError>;

    async fn add_external_host_record(
        &self,
        view_id: i64,
        name: &str,
        properties: &str,
    ) -> Result<i64, BackendError>;

    async fn add_host_record(
        &self,
        view_id: i64,
        absolute_name: &str,
        addresses: &str,
        ttl: u32,
        properties: &str,
    ) -> Result<i64, BackendError>;

    async fn delete(&self, id: i64) -> Result<(), BackendError>;

    async fn get_ip4_address(
        &self,
        container_id: i64,
        address: &str,
    ) -> Result<Entity, BackendError>;

    async fn assign_next_available_ip4_address(
        &self,
        assignment: &IpAssignment,
    ) -> Result<Entity, BackendError>;

    async fn add_mac_address(
        &self,
        configuration_id: i64,
        mac: &str,
        properties: &str,
    ) -> Result<i64, BackendError>;

    async fn associate_mac_address_with_pool(
        &self,
        configuration_id: i64,
        mac: &str,
        pool_id: i64,
    ) -> Result<(), BackendError>;

    async fn get_mac_address(
        &self,
        configuration_id: i64,
        mac: &str,
    ) -> Result<Entity, BackendError>;

    async fn update_properties(&self, id: i64, properties: &str) -> Result<(), BackendError>;

    async fn custom_search(
        &self,
        filters: &[String],
        entity_type: EntityType,
    ) -> Result<Vec<Entity>, BackendError>;
}
