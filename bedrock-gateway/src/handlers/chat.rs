use super::TEXT_PLAIN_UTF8;
use crate::dtos::{ChatInput, JsonOrForm};
use crate::services::providers::{ProviderStream, StreamChunk};
use crate::startup::AppState;
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    BoxError,
};
use service_core::error::AppError;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

/// `POST /bedrock-haiku`: chat with Claude 3 Haiku, streamed.
pub async fn chat_haiku(
    State(state): State<AppState>,
    JsonOrForm(input): JsonOrForm<ChatInput>,
) -> Result<Response, AppError> {
    let model_id = state.config.bedrock.haiku_model_id.clone();
    relay_chat(&state, &model_id, input).await
}

/// `POST /bedrock-stream`: chat with Claude v2, streamed.
pub async fn chat_claude2(
    State(state): State<AppState>,
    JsonOrForm(input): JsonOrForm<ChatInput>,
) -> Result<Response, AppError> {
    let model_id = state.config.bedrock.claude2_model_id.clone();
    relay_chat(&state, &model_id, input).await
}

/// Invoke the model once and forward each text chunk as it arrives.
///
/// Errors raised before the first chunk become an HTTP error status; an error
/// after streaming started, or the write timeout passing, can only truncate
/// the body.
async fn relay_chat(state: &AppState, model_id: &str, input: ChatInput) -> Result<Response, AppError> {
    let deadline = Instant::now() + state.config.server.write_timeout();
    let request = input.into_chat_request()?;

    tracing::info!(
        model = %model_id,
        prompt_len = request.prompt_len(),
        turns = request.messages.len(),
        "Relaying chat request"
    );

    let stream = state
        .text_provider
        .generate_stream(model_id, &request)
        .await
        .map_err(|e| {
            tracing::error!(model = %model_id, error = %e, "Model invocation failed");
            AppError::from(e)
        })?;

    let body = relay_until(stream, deadline, model_id.to_string());

    Ok((
        [
            (header::CONTENT_TYPE, TEXT_PLAIN_UTF8),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

/// Copy text chunks from `stream` into the response body until it completes,
/// fails or `deadline` passes. The provider stream is dropped as soon as the
/// client goes away or the deadline fires.
fn relay_until(
    mut stream: ProviderStream,
    deadline: Instant,
    model: String,
) -> ReceiverStream<Result<String, BoxError>> {
    let (tx, rx) = mpsc::channel::<Result<String, BoxError>>(32);

    tokio::spawn(async move {
        let timeout = sleep_until(deadline);
        tokio::pin!(timeout);
        let mut chunk_count = 0usize;

        loop {
            let item = tokio::select! {
                item = stream.next() => item,
                _ = &mut timeout => {
                    tracing::warn!(model = %model, chunks = chunk_count, "Chat stream exceeded write timeout");
                    let _ = tx.send(Err("write timeout exceeded".into())).await;
                    return;
                }
            };

            match item {
                Some(Ok(StreamChunk::Text(text))) => {
                    chunk_count += 1;
                    if tx.send(Ok(text)).await.is_err() {
                        tracing::debug!(model = %model, chunks = chunk_count, "Client went away mid-stream");
                        return;
                    }
                }
                Some(Ok(StreamChunk::Complete {
                    input_tokens,
                    output_tokens,
                    finish_reason,
                })) => {
                    tracing::info!(
                        model = %model,
                        chunks = chunk_count,
                        input_tokens = ?input_tokens,
                        output_tokens = ?output_tokens,
                        finish_reason = ?finish_reason,
                        "Chat stream completed"
                    );
                    return;
                }
                Some(Err(e)) => {
                    tracing::error!(model = %model, chunks = chunk_count, error = %e, "Chat stream aborted");
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
                None => return,
            }
        }
    });

    ReceiverStream::new(rx)
}
