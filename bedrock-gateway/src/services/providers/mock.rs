//! Mock provider implementation for testing.

use super::{
    ChatRequest, FinishReason, ProviderError, ProviderResponse, ProviderStream, StreamChunk,
    TextProvider,
};
use async_trait::async_trait;
use tokio_stream::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ordered record of calls made against mocks, shared between them so tests
/// can assert on cross-client ordering.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, event: impl Into<String>) {
        if let Ok(mut events) = self.0.lock() {
            events.push(event.into());
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

/// Failure a mock should report instead of answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    RateLimited,
    InvalidModel,
    Network,
}

impl MockFailure {
    fn to_error(self) -> ProviderError {
        match self {
            MockFailure::RateLimited => ProviderError::RateLimited,
            MockFailure::InvalidModel => {
                ProviderError::InvalidRequest("The provided model identifier is invalid.".into())
            }
            MockFailure::Network => ProviderError::NetworkError("connection reset".into()),
        }
    }
}

/// Mock text provider answering with a fixed list of chunks.
pub struct MockTextProvider {
    chunks: Vec<String>,
    delay: Duration,
    failure: Option<MockFailure>,
    stream_failure: Option<MockFailure>,
    stall: bool,
    calls: AtomicUsize,
    last_request: Mutex<Option<(String, ChatRequest)>>,
    log: CallLog,
}

impl MockTextProvider {
    /// Answer with `reply` as a single chunk.
    pub fn new(reply: impl Into<String>) -> Self {
        Self::with_chunks(vec![reply.into()])
    }

    pub fn with_chunks(chunks: Vec<String>) -> Self {
        Self {
            chunks,
            delay: Duration::ZERO,
            failure: None,
            stream_failure: None,
            stall: false,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
            log: CallLog::default(),
        }
    }

    pub fn failing(failure: MockFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::with_chunks(Vec::new())
        }
    }

    /// Stream `chunks`, then fail instead of completing.
    pub fn failing_mid_stream(chunks: Vec<String>, failure: MockFailure) -> Self {
        Self {
            stream_failure: Some(failure),
            ..Self::with_chunks(chunks)
        }
    }

    /// Stream `chunks`, then go silent without completing.
    pub fn stalling_after(chunks: Vec<String>) -> Self {
        Self {
            stall: true,
            ..Self::with_chunks(chunks)
        }
    }

    /// Sleep before answering, to simulate model latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Number of invocations received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Model id and request of the most recent invocation.
    pub fn last_request(&self) -> Option<(String, ChatRequest)> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }

    async fn invoke(&self, model_id: &str, request: &ChatRequest) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.record(format!("inference:{}", model_id));
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some((model_id.to_string(), request.clone()));
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    async fn generate(
        &self,
        model_id: &str,
        request: &ChatRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.invoke(model_id, request).await?;

        Ok(ProviderResponse {
            text: self.chunks.concat(),
            input_tokens: Some(request.prompt_len() as u32 / 4),
            output_tokens: Some(self.chunks.len() as u32),
            finish_reason: FinishReason::Complete,
        })
    }

    async fn generate_stream(
        &self,
        model_id: &str,
        request: &ChatRequest,
    ) -> Result<ProviderStream, ProviderError> {
        self.invoke(model_id, request).await?;

        let mut chunks: Vec<Result<StreamChunk, ProviderError>> = self
            .chunks
            .iter()
            .cloned()
            .map(|text| Ok(StreamChunk::Text(text)))
            .collect();
        if self.stall {
            return Ok(Box::pin(
                tokio_stream::iter(chunks).chain(tokio_stream::pending()),
            ));
        }

        chunks.push(match self.stream_failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(StreamChunk::Complete {
                input_tokens: Some(request.prompt_len() as u32 / 4),
                output_tokens: Some(self.chunks.len() as u32),
                finish_reason: FinishReason::Complete,
            }),
        });

        Ok(Box::pin(tokio_stream::iter(chunks)))
    }
}
