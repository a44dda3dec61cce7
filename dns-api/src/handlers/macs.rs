use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{
    backend::Entity,
    dtos::{CreateMacRequest, CreatedResponse, UpdateMacRequest},
    middleware::AccountContext,
    utils::validation::ValidatedJson,
    AppState,
};

pub async fn create_mac(
    ctx: AccountContext,
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateMacRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let id = state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.create_mac(&request).await })
        })
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn get_mac(
    ctx: AccountContext,
    State(state): State<AppState>,
    Path((_, mac)): Path<(String, String)>,
) -> Result<Json<Entity>, AppError> {
    let entity = state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.get_mac(&mac).await })
        })
        .await?;
    Ok(Json(entity))
}

/// Partial update; a body with neither `macpool` nor `properties` is
/// rejected before any backend session is opened.
pub async fn update_mac(
    ctx: AccountContext,
    State(state): State<AppState>,
    Path((_, mac)): Path<(String, String)>,
    ValidatedJson(request): ValidatedJson<UpdateMacRequest>,
) -> Result<StatusCode, AppError> {
    if request.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "required parameter(s) not specified"
        )));
    }

    state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.update_mac(&mac, &request).await })
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
