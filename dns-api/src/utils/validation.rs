use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use validator::Validate;

/// JSON body that has been parsed and validated.
///
/// An empty body is a 400; a body that does not match `T` or fails its
/// validation rules is a 422.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(AppError::BadRequest(anyhow::anyhow!("empty request body")));
        }

        let value: T = serde_json::from_slice(&body)
            .map_err(|e| AppError::SchemaValidation(e.to_string()))?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}
