//! In-memory backend for tests and local development.
//!
//! Keeps a flat entity table with parent links, records every session call
//! and counts logins/logouts so tests can assert session discipline.

use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    parse_properties, Backend, BackendError, BackendSession, Entity, EntityType, IpAssignment,
    MAX_PAGE_SIZE,
};
use crate::config::BackendConfig;

/// Id of the configuration entity every mock store starts with.
pub const MOCK_CONFIGURATION_ID: i64 = 1;

#[derive(Debug, Clone)]
struct Stored {
    entity: Entity,
    parent_id: i64,
}

#[derive(Debug, Default)]
struct MockState {
    entities: BTreeMap<i64, Stored>,
    next_id: i64,
    failures: HashMap<&'static str, BackendError>,
    calls: Vec<String>,
}

#[derive(Debug, Default)]
struct Counters {
    logins: AtomicU64,
    logouts: AtomicU64,
    reject_login: AtomicBool,
}

/// Mock backend sharing one store across all sessions it opens.
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    counters: Arc<Counters>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> BackendError {
    BackendError::Transport("mock backend state poisoned".to_string())
}

fn page(entities: impl Iterator<Item = Entity>, start: u32, count: u32) -> Vec<Entity> {
    entities
        .skip(start as usize)
        .take(count.min(MAX_PAGE_SIZE) as usize)
        .collect()
}

fn hint_matches(options: &str, name: &str) -> bool {
    let hint = parse_properties(options).remove("hint").unwrap_or_default();
    let needle = hint.trim_matches(|c| c == '*' || c == '$');
    match needle.strip_prefix('^') {
        Some(prefix) => name.starts_with(prefix),
        None => name.contains(needle),
    }
}

fn with_property(properties: Option<&str>, key: &str, value: &str) -> String {
    let mut bag = properties.map(parse_properties).unwrap_or_default();
    bag.insert(key.to_string(), value.to_string());
    bag.iter().map(|(k, v)| format!("{}={}|", k, v)).collect()
}

impl MockState {
    fn insert(&mut self, parent_id: i64, mut entity: Entity) -> i64 {
        if entity.id == 0 {
            self.next_id += 1;
            entity.id = self.next_id;
        } else {
            self.next_id = self.next_id.max(entity.id);
        }
        let id = entity.id;
        self.entities.insert(id, Stored { entity, parent_id });
        id
    }

    fn of_type(&self, entity_type: EntityType) -> impl Iterator<Item = &Stored> {
        self.entities
            .values()
            .filter(move |s| s.entity.kind() == Some(entity_type))
    }

    fn find_mac(&self, mac: &str) -> Option<&Stored> {
        self.of_type(EntityType::MacAddress)
            .find(|s| s.entity.name.as_deref() == Some(mac))
    }
}

impl MockBackend {
    pub fn new() -> Self {
        let mut state = MockState {
            next_id: 1000,
            ..MockState::default()
        };
        state.insert(
            0,
            Entity::new(MOCK_CONFIGURATION_ID, "default", EntityType::Configuration, ""),
        );

        Self {
            state: Arc::new(Mutex::new(state)),
            counters: Arc::new(Counters::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>, BackendError> {
        self.state.lock().map_err(poisoned)
    }

    /// Store `entity` under `parent_id`; id 0 allocates a fresh id.
    pub fn insert(&self, parent_id: i64, entity: Entity) -> Result<i64, BackendError> {
        Ok(self.lock()?.insert(parent_id, entity))
    }

    pub fn entity(&self, id: i64) -> Option<Entity> {
        self.lock()
            .ok()
            .and_then(|state| state.entities.get(&id).map(|s| s.entity.clone()))
    }

    /// Make every call to `operation` fail with `error`.
    pub fn fail_on(&self, operation: &'static str, error: BackendError) -> Result<(), BackendError> {
        self.lock()?.failures.insert(operation, error);
        Ok(())
    }

    pub fn reject_logins(&self) {
        self.counters.reject_login.store(true, Ordering::SeqCst);
    }

    /// Session calls in order, formatted `operation(arg, ...)`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn logins(&self) -> u64 {
        self.counters.logins.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> u64 {
        self.counters.logouts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn login(&self, config: &BackendConfig) -> Result<Box<dyn BackendSession>, BackendError> {
        if self.counters.reject_login.load(Ordering::SeqCst) {
            return Err(BackendError::Login(format!(
                "invalid credentials for {}",
                config.username
            )));
        }

        self.counters.logins.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(username = %config.username, "[MOCK] Backend session opened");

        Ok(Box::new(MockSession {
            backend: self.clone(),
        }))
    }
}

struct MockSession {
    backend: MockBackend,
}

impl MockSession {
    /// Record the call, then either hand out the store or the injected failure.
    fn begin(&self, operation: &'static str, args: String) -> Result<MutexGuard<'_, MockState>, BackendError> {
        let mut state = self.backend.lock()?;
        state.calls.push(format!("{}({})", operation, args));
        if let Some(error) = state.failures.get(operation).cloned() {
            return Err(error);
        }
        Ok(state)
    }
}

#[async_trait]
impl BackendSession for MockSession {
    async fn logout(&self) -> Result<(), BackendError> {
        self.backend.counters.logouts.fetch_add(1, Ordering::SeqCst);
        self.begin("logout", String::new()).map(|_| ())
    }

    async fn get_entity_by_id(&self, id: i64) -> Result<Entity, BackendError> {
        let state = self.begin("get_entity_by_id", id.to_string())?;
        state
            .entities
            .get(&id)
            .map(|s| s.entity.clone())
            .ok_or_else(|| BackendError::NotFound(format!("id {}", id)))
    }

    async fn get_entity_by_name(
        &self,
        parent_id: i64,
        name: &str,
        entity_type: EntityType,
    ) -> Result<Entity, BackendError> {
        let state = self.begin(
            "get_entity_by_name",
            format!("{}, {}, {}", parent_id, name, entity_type),
        )?;
        let entity = state
            .of_type(entity_type)
            .find(|s| s.parent_id == parent_id && s.entity.name.as_deref() == Some(name))
            .map(|s| s.entity.clone());
        entity.ok_or_else(|| BackendError::NotFound(format!("{} {}", entity_type, name)))
    }

    async fn get_entities(
        &self,
        parent_id: i64,
        entity_type: EntityType,
        start: u32,
        count: u32,
    ) -> Result<Vec<Entity>, BackendError> {
        let state = self.begin(
            "get_entities",
            format!("{}, {}, {}, {}", parent_id, entity_type, start, count),
        )?;
        Ok(page(
            state
                .of_type(entity_type)
                .filter(|s| s.parent_id == parent_id)
                .map(|s| s.entity.clone()),
            start,
            count,
        ))
    }

    async fn search_by_object_types(
        &self,
        keyword: &str,
        entity_type: EntityType,
        start: u32,
        count: u32,
    ) -> Result<Vec<Entity>, BackendError> {
        let state = self.begin(
            "search_by_object_types",
            format!("{}, {}, {}, {}", keyword, entity_type, start, count),
        )?;
        Ok(page(
            state
                .of_type(entity_type)
                .filter(|s| s.entity.name.as_deref().unwrap_or_default().contains(keyword))
                .map(|s| s.entity.clone()),
            start,
            count,
        ))
    }

    async fn get_parent(&self, id: i64) -> Result<Entity, BackendError> {
        let state = self.begin("get_parent", id.to_string())?;
        state
            .entities
            .get(&id)
            .and_then(|s| state.entities.get(&s.parent_id))
            .map(|s| s.entity.clone())
            .ok_or_else(|| BackendError::NotFound(format!("parent of {}", id)))
    }

    async fn get_zones_by_hint(
        &self,
        container_id: i64,
        start: u32,
        count: u32,
        options: &str,
    ) -> Result<Vec<Entity>, BackendError> {
        let state = self.begin(
            "get_zones_by_hint",
            format!("{}, {}, {}, {}", container_id, start, count, options),
        )?;
        Ok(page(
            state
                .of_type(EntityType::Zone)
                .filter(|s| hint_matches(options, s.entity.name.as_deref().unwrap_or_default()))
                .map(|s| s.entity.clone()),
            start,
            count,
        ))
    }

    async fn get_ip4_networks_by_hint(
        &self,
        container_id: i64,
        start: u32,
        count: u32,
        options: &str,
    ) -> Result<Vec<Entity>, BackendError> {
        let state = self.begin(
            "get_ip4_networks_by_hint",
            format!("{}, {}, {}, {}", container_id, start, count, options),
        )?;
        Ok(page(
            state
                .of_type(EntityType::Ip4Network)
                .filter(|s| {
                    let cidr = s.entity.property("CIDR").unwrap_or_default();
                    hint_matches(options, &cidr)
                })
                .map(|s| s.entity.clone()),
            start,
            count,
        ))
    }

    async fn get_host_records_by_hint(
        &self,
        start: u32,
        count: u32,
        options: &str,
    ) -> Result<Vec<Entity>, BackendError> {
        let state = self.begin(
            "get_host_records_by_hint",
            format!("{}, {}, {}", start, count, options),
        )?;
        Ok(page(
            state
                .of_type(EntityType::HostRecord)
                .filter(|s| hint_matches(options, s.entity.name.as_deref().unwrap_or_default()))
                .map(|s| s.entity.clone()),
            start,
            count,
        ))
    }

    async fn get_aliases_by_hint(
        &self,
        start: u32,
        count: u32,
        options: &str,
    ) -> Result<Vec<Entity>, BackendError> {
        let state = self.begin(
            "get_aliases_by_hint",
            format!("{}, {}, {}", start, count, options),
        )?;
        Ok(page(
            state
                .of_type(EntityType::CnameRecord)
                .filter(|s| hint_matches(options, s.entity.name.as_deref().unwrap_or_default()))
                .map(|s| s.entity.clone()),
            start,
            count,
        ))
    }

    async fn add_alias_record(
        &self,
        view_id: i64,
        absolute_name: &str,
        linked_record_name: &str,
        ttl: u32,
        properties: &str,
    ) -> Result<i64, BackendError> {
        let mut state = self.begin(
            "add_alias_record",
            format!(
                "{}, {}, {}, {}, {:?}",
                view_id, absolute_name, linked_record_name, ttl, properties
            ),
        )?;
        let properties = format!(
            "ttl={}|linkedRecordName={}|{}",
            ttl, linked_record_name, properties
        );
        Ok(state.insert(
            view_id,
            Entity::new(0, absolute_name, EntityType::CnameRecord, &properties),
        ))
    }

    async fn add_external_host_record(
        &self,
        view_id: i64,
        name: &str,
        properties: &str,
    ) -> Result<i64, BackendError> {
        let mut state = self.begin(
            "add_external_host_record",
            format!("{}, {}, {:?}", view_id, name, properties),
        )?;
        Ok(state.insert(
            view_id,
            Entity::new(0, name, EntityType::ExternalHost, properties),
        ))
    }

    async fn add_host_record(
        &self,
        view_id: i64,
        absolute_name: &str,
        addresses: &str,
        ttl: u32,
        properties: &str,
    ) -> Result<i64, BackendError> {
        let mut state = self.begin(
            "add_host_record",
            format!(
                "{}, {}, {}, {}, {:?}",
                view_id, absolute_name, addresses, ttl, properties
            ),
        )?;
        let properties = format!("ttl={}|addresses={}|{}", ttl, addresses, properties);
        Ok(state.insert(
            view_id,
            Entity::new(0, absolute_name, EntityType::HostRecord, &properties),
        ))
    }

    async fn delete(&self, id: i64) -> Result<(), BackendError> {
        let mut state = self.begin("delete", id.to_string())?;
        state
            .entities
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("id {}", id)))
    }

    async fn get_ip4_address(
        &self,
        container_id: i64,
        address: &str,
    ) -> Result<Entity, BackendError> {
        let state = self.begin("get_ip4_address", format!("{}, {}", container_id, address))?;
        let entity = state
            .of_type(EntityType::Ip4Address)
            .find(|s| s.entity.property("address").as_deref() == Some(address))
            .map(|s| s.entity.clone())
            .unwrap_or_default();
        Ok(entity)
    }

    async fn assign_next_available_ip4_address(
        &self,
        assignment: &IpAssignment,
    ) -> Result<Entity, BackendError> {
        let mut state = self.begin(
            "assign_next_available_ip4_address",
            format!(
                "{}, {}, {}, {}, {}, {:?}",
                assignment.configuration_id,
                assignment.network_id,
                assignment.mac.as_deref().unwrap_or_default(),
                assignment.host_info,
                assignment.action,
                assignment.properties
            ),
        )?;

        let network = state
            .entities
            .get(&assignment.network_id)
            .filter(|s| s.entity.kind() == Some(EntityType::Ip4Network))
            .and_then(|s| s.entity.property("CIDR"))
            .ok_or_else(|| BackendError::NotFound(format!("network {}", assignment.network_id)))?;
        let network: Ipv4Network = network
            .parse()
            .map_err(|e| BackendError::Status { status: 500, message: format!("{}", e) })?;

        let taken: Vec<String> = state
            .of_type(EntityType::Ip4Address)
            .filter_map(|s| s.entity.property("address"))
            .collect();
        let address = network
            .iter()
            .skip(1)
            .map(|ip| ip.to_string())
            .find(|ip| !taken.contains(ip))
            .ok_or_else(|| BackendError::Status {
                status: 409,
                message: format!("no free address in {}", network),
            })?;

        let hostname = assignment.host_info.split(',').next().unwrap_or_default();
        let properties = format!("address={}|state=STATIC|{}|", address, assignment.properties);
        let id = state.insert(
            assignment.network_id,
            Entity::new(0, hostname, EntityType::Ip4Address, &properties),
        );

        state
            .entities
            .get(&id)
            .map(|s| s.entity.clone())
            .ok_or_else(|| BackendError::NotFound(format!("id {}", id)))
    }

    async fn add_mac_address(
        &self,
        configuration_id: i64,
        mac: &str,
        properties: &str,
    ) -> Result<i64, BackendError> {
        let mut state = self.begin(
            "add_mac_address",
            format!("{}, {}, {:?}", configuration_id, mac, properties),
        )?;
        if state.find_mac(mac).is_some() {
            return Err(BackendError::Status {
                status: 409,
                message: format!("Duplicate of another item: {}", mac),
            });
        }
        let properties = format!("address={}|{}", mac, properties);
        Ok(state.insert(
            configuration_id,
            Entity::new(0, mac, EntityType::MacAddress, &properties),
        ))
    }

    async fn associate_mac_address_with_pool(
        &self,
        configuration_id: i64,
        mac: &str,
        pool_id: i64,
    ) -> Result<(), BackendError> {
        let mut state = self.begin(
            "associate_mac_address_with_pool",
            format!("{}, {}, {}", configuration_id, mac, pool_id),
        )?;
        let id = state
            .find_mac(mac)
            .map(|s| s.entity.id)
            .ok_or_else(|| BackendError::NotFound(format!("MAC address {}", mac)))?;
        if let Some(stored) = state.entities.get_mut(&id) {
            let properties =
                with_property(stored.entity.properties.as_deref(), "macPool", &pool_id.to_string());
            stored.entity.properties = Some(properties);
        }
        Ok(())
    }

    async fn get_mac_address(
        &self,
        configuration_id: i64,
        mac: &str,
    ) -> Result<Entity, BackendError> {
        let state = self.begin("get_mac_address", format!("{}, {}", configuration_id, mac))?;
        Ok(state
            .find_mac(mac)
            .map(|s| s.entity.clone())
            .unwrap_or_default())
    }

    async fn update_properties(&self, id: i64, properties: &str) -> Result<(), BackendError> {
        let mut state = self.begin("update_properties", format!("{}, {:?}", id, properties))?;
        let stored = state
            .entities
            .get_mut(&id)
            .ok_or_else(|| BackendError::NotFound(format!("id {}", id)))?;
        stored.entity.properties = Some(properties.to_string());
        Ok(())
    }

    async fn custom_search(
        &self,
        filters: &[String],
        entity_type: EntityType,
    ) -> Result<Vec<Entity>, BackendError> {
        let state = self.begin(
            "custom_search",
            format!("{:?}, {}", filters, entity_type),
        )?;
        let wanted: Vec<(&str, &str)> = filters.iter().filter_map(|f| f.split_once('=')).collect();
        Ok(page(
            state
                .of_type(entity_type)
                .filter(|s| {
                    let bag = s.entity.properties.as_deref().map(parse_properties).unwrap_or_default();
                    wanted
                        .iter()
                        .all(|(k, v)| bag.get(*k).map(String::as_str) == Some(*v))
                })
                .map(|s| s.entity.clone()),
            0,
            MAX_PAGE_SIZE,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn backend_config() -> BackendConfig {
        BackendConfig {
            url: "http://mock".to_string(),
            username: "api".to_string(),
            password: Secret::new("secret".to_string()),
            view_id: 7,
            timeout_seconds: 30,
            accept_invalid_certs: false,
        }
    }

    #[tokio::test]
    async fn pages_are_capped_at_backend_maximum() {
        let backend = MockBackend::new();
        for i in 0..15 {
            backend
                .insert(7, Entity::new(0, format!("host{}.example.com", i), EntityType::HostRecord, ""))
                .unwrap();
        }

        let session = backend.login(&backend_config()).await.unwrap();
        let first = session.get_host_records_by_hint(0, 50, "").await.unwrap();
        assert_eq!(first.len(), 10);
        let rest = session.get_host_records_by_hint(10, 10, "").await.unwrap();
        assert_eq!(rest.len(), 5);

        let hinted = session
            .get_host_records_by_hint(0, 10, "hint=^host1")
            .await
            .unwrap();
        assert_eq!(hinted.len(), 6);
    }

    #[tokio::test]
    async fn injected_failures_are_returned_and_recorded() {
        let backend = MockBackend::new();
        backend
            .fail_on("delete", BackendError::Status { status: 503, message: "busy".to_string() })
            .unwrap();

        let session = backend.login(&backend_config()).await.unwrap();
        let err = session.delete(42).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        session.logout().await.unwrap();

        assert_eq!(backend.calls(), vec!["delete(42)".to_string(), "logout()".to_string()]);
        assert_eq!((backend.logins(), backend.logouts()), (1, 1));
    }

    #[tokio::test]
    async fn assignment_skips_taken_addresses() {
        let backend = MockBackend::new();
        let network = backend
            .insert(
                MOCK_CONFIGURATION_ID,
                Entity::new(0, "lab", EntityType::Ip4Network, "CIDR=10.0.0.0/29|"),
            )
            .unwrap();
        backend
            .insert(network, Entity::new(0, "gw", EntityType::Ip4Address, "address=10.0.0.1|"))
            .unwrap();

        let session = backend.login(&backend_config()).await.unwrap();
        let assigned = session
            .assign_next_available_ip4_address(&IpAssignment {
                configuration_id: MOCK_CONFIGURATION_ID,
                network_id: network,
                mac: None,
                host_info: "web01,7,,false".to_string(),
                action: "MAKE_STATIC".to_string(),
                properties: "name=web01".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(assigned.property("address").as_deref(), Some("10.0.0.2"));
        assert_eq!(assigned.name.as_deref(), Some("web01"));
    }
}
