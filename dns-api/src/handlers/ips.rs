use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{
    backend::Entity,
    dtos::AssignIpRequest,
    gateway::AssignedAddress,
    middleware::AccountContext,
    utils::validation::ValidatedJson,
    AppState,
};

/// Assign the next free address in a network given by id or CIDR.
pub async fn assign_ip(
    ctx: AccountContext,
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<AssignIpRequest>,
) -> Result<(StatusCode, Json<AssignedAddress>), AppError> {
    let assigned = state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.assign_next_ip(&request).await })
        })
        .await?;
    Ok((StatusCode::CREATED, Json(assigned)))
}

/// Raw contents of the account's CIDR allow-list file.
pub async fn list_cidrs(ctx: AccountContext) -> Result<String, AppError> {
    let path = ctx
        .account
        .cidr_file
        .as_deref()
        .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("CIDR file not defined")))?;

    tokio::fs::read_to_string(path).await.map_err(|e| {
        tracing::error!(account = %ctx.account.name, path, error = %e, "Failed to read CIDR file");
        AppError::InternalError(anyhow::anyhow!("Failed to read CIDR file: {}", e))
    })
}

pub async fn get_ip(
    ctx: AccountContext,
    State(state): State<AppState>,
    Path((_, ip)): Path<(String, String)>,
) -> Result<Json<Entity>, AppError> {
    let address = state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.get_ip4_address(&ip).await })
        })
        .await?;
    Ok(Json(address))
}

pub async fn update_ip(_ctx: AccountContext) -> Result<StatusCode, AppError> {
    Err(AppError::NotImplemented)
}

pub async fn delete_ip(
    ctx: AccountContext,
    State(state): State<AppState>,
    Path((_, ip)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state
        .with_gateway(ctx.account, move |gw| {
            Box::pin(async move { gw.delete_ip4_address(&ip).await })
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
