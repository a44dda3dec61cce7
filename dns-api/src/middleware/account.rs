//! Account resolution and credential checks for `/v1/dns` routes.
//!
//! Account-scoped handlers take [`AccountContext`] as their first
//! argument: the `:account` path segment is resolved first (unknown
//! accounts are 404 whatever the credential), then the credential header
//! is authorized for the request method. Handlers that are not account
//! scoped but still need a credential take [`Authorized`].

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AccountConfig;
use crate::AppState;

/// The configured account a request is scoped to.
#[derive(Debug, Clone)]
pub struct AccountContext {
    pub account: Arc<AccountConfig>,
}

/// Marker for requests whose credential has been accepted.
#[derive(Debug, Clone, Copy)]
pub struct Authorized;

fn authorize(parts: &Parts, state: &AppState) -> Result<(), AppError> {
    let presented = parts.headers.get(state.authority.header()).map(|value| {
        value
            .to_str()
            .map(str::to_string)
            .unwrap_or_else(|_| String::from_utf8_lossy(value.as_bytes()).into_owned())
    });

    if state
        .authority
        .authorize(presented.as_deref(), parts.method.as_str())
    {
        Ok(())
    } else {
        Err(AppError::Unauthorized(anyhow::anyhow!("Invalid token")))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Authorized {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authorize(parts, state).map(|_| Authorized)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AccountContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;

        let name = params
            .get("account")
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("missing account")))?;

        let account = state.accounts.get(name).ok_or_else(|| {
            tracing::debug!(account = %name, "Request for unknown account");
            AppError::NotFound(anyhow::anyhow!("Unknown DNS account: {}", name))
        })?;

        authorize(parts, state)?;

        Ok(AccountContext { account })
    }
}
