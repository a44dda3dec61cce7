use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::backend::EntityType;
use crate::gateway::Page;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRecordRequest {
    #[serde(rename = "type")]
    pub record_type: EntityType,

    #[validate(length(min = 1, message = "Record name is required"))]
    pub record: String,

    /// Linked name for aliases, address list for host records.
    pub target: Option<String>,

    pub ttl: Option<u32>,

    pub properties: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_network_source"))]
pub struct AssignIpRequest {
    #[validate(length(min = 1, message = "Hostname is required"))]
    pub hostname: String,

    pub cidr: Option<String>,

    pub network_id: Option<i64>,

    pub mac: Option<String>,

    pub reverse: Option<bool>,

    pub properties: Option<String>,
}

fn validate_network_source(request: &AssignIpRequest) -> Result<(), ValidationError> {
    if request.cidr.is_none() && request.network_id.is_none() {
        let mut err = ValidationError::new("network_source");
        err.message = Some("Either cidr or network_id is required".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMacRequest {
    #[validate(length(min = 1, message = "MAC address is required"))]
    pub mac: String,

    pub macpool: Option<i64>,

    pub properties: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateMacRequest {
    pub macpool: Option<i64>,

    pub properties: Option<String>,
}

impl UpdateMacRequest {
    pub fn is_empty(&self) -> bool {
        self.macpool.is_none() && self.properties.is_none()
    }
}

/// `offset`/`limit`/`hint` query parameters of the hinted listings.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub offset: Option<u32>,
    pub limit: Option<u32>,
    pub hint: Option<String>,
}

impl ListQuery {
    pub fn page(&self) -> Page {
        Page::from_query(self.offset, self.limit)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordsQuery {
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
    pub hint: Option<String>,
    pub name: Option<String>,
    pub keyword: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub filters: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CreatedResponse {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
}
