use axum::http::StatusCode;
use service_core::error::AppError;
use thiserror::Error;

use crate::backend::BackendError;

/// Failure kinds surfaced by gateway operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("Backend error: {message}")]
    Backend { status: Option<u16>, message: String },
}

impl GatewayError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        GatewayError::BadRequest(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::SchemaValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::Backend { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        let status = err.status();
        match err {
            BackendError::NotFound(_) => GatewayError::NotFound,
            BackendError::Status { message, .. } => GatewayError::Backend { status, message },
            other => GatewayError::Backend {
                status,
                message: other.to_string(),
            },
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let status = err.status_code();
        match err {
            GatewayError::NotFound => AppError::NotFound(anyhow::anyhow!("Not found")),
            GatewayError::BadRequest(message) => AppError::BadRequest(anyhow::anyhow!(message)),
            GatewayError::SchemaValidation(message) => AppError::SchemaValidation(message),
            GatewayError::Backend { message, .. } => AppError::Upstream { status, message },
        }
    }
}
