use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    backend::{Entity, EntityType},
    dtos::ListQuery,
    gateway::GatewayError,
    middleware::AccountContext,
    AppState,
};

/// Zones of the account, paged and optionally narrowed by `hint`.
/// A failed lookup is an empty list.
pub async fn list_zones(
    ctx: AccountContext,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Entity>>, AppError> {
    let page = query.page();
    let result = state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.list_zones(page, query.hint.as_deref()).await })
        })
        .await;

    match result {
        Ok(zones) => Ok(Json(zones)),
        Err(GatewayError::NotFound | GatewayError::BadRequest(_)) => Ok(Json(Vec::new())),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_zone(
    ctx: AccountContext,
    State(state): State<AppState>,
    Path((_, id)): Path<(String, i64)>,
) -> Result<Json<Entity>, AppError> {
    let zone = state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.get_entity(id, &[EntityType::Zone]).await })
        })
        .await?;
    Ok(Json(zone))
}
