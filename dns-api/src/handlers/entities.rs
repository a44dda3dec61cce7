use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{backend::Entity, backend::EntityType, middleware::AccountContext, AppState};

/// Any record, address or MAC entity by backend id.
pub async fn get_entity(
    ctx: AccountContext,
    State(state): State<AppState>,
    Path((_, id)): Path<(String, i64)>,
) -> Result<Json<Entity>, AppError> {
    let entity = state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.get_entity(id, &EntityType::DEFAULT_LOOKUP).await })
        })
        .await?;
    Ok(Json(entity))
}

pub async fn delete_entity(
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
