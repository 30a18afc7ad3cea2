use crate::dtos::JsonOrForm;
use axum::{http::header, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use service_core::error::AppError;

use super::TEXT_PLAIN_UTF8;

#[derive(Debug, Deserialize)]
pub struct GreetingInput {
    #[serde(default)]
    pub name: String,
}

/// `POST /aoss`: form smoke test behind the OpenSearch page.
pub async fn aoss_greeting(
    JsonOrForm(input): JsonOrForm<GreetingInput>,
) -> Result<impl IntoResponse, AppError> {
    Ok((
        [(header::CONTENT_TYPE, TEXT_PLAIN_UTF8)],
        format!("Hello {}", input.name.trim()),
    ))
}

/// Liveness probe.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "bedrock-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
