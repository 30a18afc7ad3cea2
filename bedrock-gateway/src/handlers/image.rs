use super::TEXT_PLAIN_UTF8;
use crate::models::{build_image_request, ImageFormat};
use crate::startup::AppState;
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
};
use service_core::error::AppError;

/// `POST /claude-haiku-image`: describe an uploaded image with Claude 3 Haiku.
///
/// Multipart fields: `image` (or `file`) with the picture, optional `prompt`.
pub async fn analyze_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let mut multipart = multipart
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Expected a multipart upload: {}", e)))?;

    let mut image: Option<Bytes> = None;
    let mut prompt: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" | "file" => image = Some(field.bytes().await.map_err(multipart_error)?),
            "prompt" => prompt = Some(field.text().await.map_err(multipart_error)?),
            _ => tracing::debug!(field = %name, "Ignoring multipart field"),
        }
    }

    let image = image
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("An `image` file is required")))?;

    let max_bytes = state.config.http.max_upload_bytes;
    if image.len() > max_bytes {
        return Err(AppError::PayloadTooLarge(anyhow::anyhow!(
            "Image exceeds {} bytes",
            max_bytes
        )));
    }

    let format = ImageFormat::detect(&image).ok_or_else(|| {
        AppError::UnsupportedMediaType(anyhow::anyhow!(
            "Unsupported image encoding; use PNG, JPEG, GIF or WebP"
        ))
    })?;

    let model_id = &state.config.bedrock.haiku_model_id;
    let request = build_image_request(&image, format, prompt.as_deref());

    tracing::info!(
        model = %model_id,
        media_type = format.media_type(),
        image_bytes = image.len(),
        "Analyzing image"
    );

    let response = state
        .text_provider
        .generate(model_id, &request)
        .await
        .map_err(|e| {
            tracing::error!(model = %model_id, error = %e, "Image analysis failed");
            AppError::from(e)
        })?;

    tracing::info!(
        input_tokens = ?response.input_tokens,
        output_tokens = ?response.output_tokens,
        "Image analysis completed"
    );

    Ok(([(header::CONTENT_TYPE, TEXT_PLAIN_UTF8)], response.text))
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(anyhow::anyhow!(err.body_text()))
    } else {
        AppError::BadRequest(anyhow::anyhow!("Failed to read upload: {}", err.body_text()))
    }
}
