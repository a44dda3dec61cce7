use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{
    backend::{Entity, EntityType},
    dtos::{CreateRecordRequest, CreatedResponse, RecordsQuery},
    gateway::{ExternalHostSelector, GatewayError, Page, RecordListing},
    middleware::AccountContext,
    utils::validation::ValidatedJson,
    AppState,
};

const BAD_RECORD_TYPE: &str = "Bad or missing record type specified.";

fn listing(query: RecordsQuery) -> Result<RecordListing, AppError> {
    let record_type = query
        .record_type
        .as_deref()
        .and_then(|t| t.parse::<EntityType>().ok());

    match record_type {
        Some(EntityType::HostRecord) => Ok(RecordListing::Host { hint: query.hint }),
        Some(EntityType::CnameRecord) => Ok(RecordListing::Alias { hint: query.hint }),
        Some(EntityType::ExternalHost) => Ok(RecordListing::ExternalHost(
            ExternalHostSelector::from_query(query.name, query.keyword),
        )),
        _ => Err(AppError::BadRequest(anyhow::anyhow!(BAD_RECORD_TYPE))),
    }
}

/// Host, alias or external host records, chosen by `type`.
pub async fn list_records(
    ctx: AccountContext,
    State(state): State<AppState>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<Vec<Entity>>, AppError> {
    let page = Page::from_query(query.offset, query.limit);
    let listing = listing(query)?;

    let result = state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.list_records(page, &listing).await })
        })
        .await;

    match result {
        Ok(records) => Ok(Json(
            records.into_iter().filter(|r| !r.is_placeholder()).collect(),
        )),
        Err(GatewayError::NotFound) => Ok(Json(Vec::new())),
        Err(e) => Err(e.into()),
    }
}

pub async fn create_record(
    ctx: AccountContext,
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateRecordRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let id = state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.create_record(&request).await })
        })
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn get_record(
    ctx: AccountContext,
    State(state): State<AppState>,
    Path((_, id)): Path<(String, i64)>,
) -> Result<Json<Entity>, AppError> {
    let record = state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.get_entity(id, &EntityType::DEFAULT_LOOKUP).await })
        })
        .await?;
    Ok(Json(record))
}

pub async fn update_record(_ctx: AccountContext) -> Result<StatusCode, AppError> {
    Err(AppError::NotImplemented)
}

pub async fn delete_record(
    ctx: AccountContext,
    State(state): State<AppState>,
    Path((_, id)): Path<(String, i64)>,
) -> Result<StatusCode, AppError> {
    state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.delete_entity(id).await })
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(record_type: Option<&str>) -> RecordsQuery {
        RecordsQuery {
            record_type: record_type.map(str::to_string),
            hint: Some("^web".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn record_type_selects_listing() {
        assert_eq!(
            listing(query(Some("HostRecord"))).unwrap(),
            RecordListing::Host { hint: Some("^web".to_string()) }
        );
        assert_eq!(
            listing(query(Some("AliasRecord"))).unwrap(),
            RecordListing::Alias { hint: Some("^web".to_string()) }
        );
        assert_eq!(
            listing(query(Some("ExternalHostRecord"))).unwrap(),
            RecordListing::ExternalHost(ExternalHostSelector::All)
        );
    }

    #[test]
    fn other_record_types_are_rejected() {
        for record_type in [None, Some("MXRecord"), Some("Zone"), Some("nonsense")] {
            let err = listing(query(record_type)).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }
}
