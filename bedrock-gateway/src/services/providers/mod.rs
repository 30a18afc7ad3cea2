//! Inference provider abstraction.
//!
//! Handlers talk to a `TextProvider` trait object so the Bedrock client can be
//! swapped for a stub in tests.

pub mod bedrock;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimited => {
                AppError::TooManyRequests("Model invocation throttled".to_string(), None)
            }
            ProviderError::InvalidRequest(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ProviderError::AccessDenied(msg) => AppError::ServiceUnavailable(msg),
            ProviderError::ApiError(msg) | ProviderError::NetworkError(msg) => {
                AppError::BadGateway(msg)
            }
        }
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One piece of a conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    /// Base64-encoded image with its media type (`image/png`, ...).
    Image { media_type: String, data: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text(text.into())],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text(text.into())],
        }
    }
}

/// Generation parameters for model requests.
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    /// Maximum output tokens; the provider default applies when unset.
    pub max_tokens: Option<u32>,

    /// Temperature (0.0 - 1.0).
    pub temperature: Option<f32>,

    /// Top-p sampling.
    pub top_p: Option<f32>,

    /// Stop sequences.
    pub stop_sequences: Vec<String>,
}

/// Provider-neutral chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub params: GenerationParams,
}

impl ChatRequest {
    pub fn single_turn(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            ..Default::default()
        }
    }

    /// Total length of the text blocks, for logging.
    pub fn prompt_len(&self) -> usize {
        self.messages
            .iter()
            .flat_map(|m| m.content.iter())
            .map(|block| match block {
                ContentBlock::Text(text) => text.len(),
                ContentBlock::Image { .. } => 0,
            })
            .sum()
    }
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    StopSequence,
}

impl FinishReason {
    pub fn from_stop_reason(reason: &str) -> Self {
        match reason {
            "max_tokens" | "length" => FinishReason::Length,
            "stop_sequence" => FinishReason::StopSequence,
            _ => FinishReason::Complete,
        }
    }
}

/// Result of a buffered invocation.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub finish_reason: FinishReason,
}

/// Stream chunk for streaming responses.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text chunk, in model order.
    Text(String),

    /// Final completion with usage stats.
    Complete {
        input_tokens: Option<u32>,
        output_tokens: Option<u32>,
        finish_reason: FinishReason,
    },
}

/// Type alias for provider streams.
pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Trait for chat/analysis providers (e.g., Bedrock Runtime).
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Invoke `model_id` and wait for the full answer.
    async fn generate(
        &self,
        model_id: &str,
        request: &ChatRequest,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Invoke `model_id` and stream the answer as it is produced.
    async fn generate_stream(
        &self,
        model_id: &str,
        request: &ChatRequest,
    ) -> Result<ProviderStream, ProviderError>;
}
