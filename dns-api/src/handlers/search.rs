use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    backend::{Entity, EntityType},
    dtos::SearchQuery,
    middleware::AccountContext,
    AppState,
};

fn supported_types() -> String {
    EntityType::ALL
        .iter()
        .map(EntityType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_search(query: SearchQuery) -> Result<(String, EntityType), AppError> {
    let filters = query
        .filters
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("no filters parameter specified")))?;
    let name = query
        .entity_type
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("no type parameter specified")))?;
    let entity_type = name.parse::<EntityType>().map_err(|_| {
        AppError::BadRequest(anyhow::anyhow!(
            "unknown type: {}. Supported types are [{}]",
            name,
            supported_types()
        ))
    })?;
    Ok((filters, entity_type))
}

/// Typed search with `|`-separated `key=value` filters.
pub async fn search(
    ctx: AccountContext,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Entity>>, AppError> {
    let (filters, entity_type) = parse_search(query)?;

    let entities = state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.custom_search(&filters, entity_type).await })
        })
        .await?;
    Ok(Json(entities))
}
