//! Inbound request bodies.
//!
//! The browser pages post URL-encoded forms while scripted callers tend to
//! send JSON, so chat and search inputs accept either.

pub mod chat;
pub mod search;

pub use chat::{ChatInput, InboundMessage};
pub use search::{SearchInput, VectorInput};

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
    Form, Json,
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;

/// Body extractor accepting `application/json`, a URL-encoded form, or (for
/// GET) the query string.
#[derive(Debug, Clone)]
pub struct JsonOrForm<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonOrForm<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
                AppError::BadRequest(anyhow::anyhow!("Invalid JSON body: {}", e.body_text()))
            })?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state).await.map_err(|e| {
                AppError::BadRequest(anyhow::anyhow!("Invalid form input: {}", e.body_text()))
            })?;
            Ok(Self(value))
        }
    }
}
