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

/// IPv4 networks of the account. NotFound is an empty list; a bad
/// request is still reported.
pub async fn list_networks(
    ctx: AccountContext,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Entity>>, AppError> {
    let page = query.page();
    let result = state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.list_networks(page, query.hint.as_deref()).await })
        })
        .await;

    match result {
        Ok(networks) => Ok(Json(networks)),
        Err(GatewayError::NotFound) => Ok(Json(Vec::new())),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_network(
    ctx: AccountContext,
    State(state): State<AppState>,
    Path((_, id)): Path<(String, i64)>,
) -> Result<Json<Entity>, AppError> {
    let network = state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.get_entity(id, &[EntityType::Ip4Network]).await })
        })
        .await?;
    Ok(Json(network))
}
