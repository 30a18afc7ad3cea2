//! Bedrock Runtime provider implementation.
//!
//! Speaks the two Anthropic request schemas Bedrock accepts: the Messages API
//! (Claude 3 family) and the legacy text-completion API (Claude v2 / Instant).
//! Supports both buffered and streaming invocations.

use super::{
    ChatRequest, ContentBlock, FinishReason, ProviderError, ProviderResponse, ProviderStream,
    Role, StreamChunk, TextProvider,
};
use crate::config::BedrockConfig;
use async_trait::async_trait;
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::types::ResponseStream;
use aws_sdk_bedrockruntime::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Request schema a Bedrock model id expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// Anthropic Messages API (Claude 3 and later).
    Messages,
    /// Anthropic text completions (`\n\nHuman: ... \n\nAssistant:`).
    TextCompletion,
}

impl ModelFamily {
    pub fn from_model_id(model_id: &str) -> Result<Self, ProviderError> {
        if model_id.contains("anthropic.claude-v2") || model_id.contains("anthropic.claude-instant")
        {
            Ok(ModelFamily::TextCompletion)
        } else if model_id.contains("anthropic.claude") {
            Ok(ModelFamily::Messages)
        } else {
            Err(ProviderError::InvalidRequest(format!(
                "Unsupported model id: {}",
                model_id
            )))
        }
    }
}

/// Bedrock Runtime text provider.
pub struct BedrockProvider {
    client: Client,
    anthropic_version: String,
    default_max_tokens: u32,
}

impl BedrockProvider {
    pub fn new(client: Client, config: &BedrockConfig) -> Self {
        Self {
            client,
            anthropic_version: config.anthropic_version.clone(),
            default_max_tokens: config.max_tokens,
        }
    }

    /// Serialize `request` into the body `model_id` expects.
    pub fn build_body(&self, model_id: &str, request: &ChatRequest) -> Result<Vec<u8>, ProviderError> {
        let body = match ModelFamily::from_model_id(model_id)? {
            ModelFamily::Messages => serde_json::to_vec(&self.messages_request(request)),
            ModelFamily::TextCompletion => {
                serde_json::to_vec(&self.text_completion_request(request)?)
            }
        };

        body.map_err(|e| ProviderError::InvalidRequest(format!("Failed to encode request: {}", e)))
    }

    fn messages_request<'a>(&'a self, request: &'a ChatRequest) -> MessagesRequest<'a> {
        let messages = request
            .messages
            .iter()
            .map(|message| Message {
                role: message.role,
                content: message
                    .content
                    .iter()
                    .map(|block| match block {
                        ContentBlock::Text(text) => MessageContent::Text { text },
                        ContentBlock::Image { media_type, data } => MessageContent::Image {
                            source: ImageSource {
                                kind: "base64",
                                media_type,
                                data,
                            },
                        },
                    })
                    .collect(),
            })
            .collect();

        MessagesRequest {
            anthropic_version: &self.anthropic_version,
            max_tokens: request.params.max_tokens.unwrap_or(self.default_max_tokens),
            system: request.system.as_deref(),
            messages,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            stop_sequences: &request.params.stop_sequences,
        }
    }

    fn text_completion_request<'a>(
        &self,
        request: &'a ChatRequest,
    ) -> Result<TextCompletionRequest<'a>, ProviderError> {
        let mut prompt = String::new();

        if let Some(system) = &request.system {
            prompt.push_str(system);
        }

        for message in &request.messages {
            let speaker = match message.role {
                Role::User => "Human",
                Role::Assistant => "Assistant",
            };
            prompt.push_str("\n\n");
            prompt.push_str(speaker);
            prompt.push(':');

            for block in &message.content {
                match block {
                    ContentBlock::Text(text) => {
                        prompt.push(' ');
                        prompt.push_str(text);
                    }
                    ContentBlock::Image { .. } => {
                        return Err(ProviderError::InvalidRequest(
                            "Text completion models do not accept images".to_string(),
                        ));
                    }
                }
            }
        }

        prompt.push_str("\n\nAssistant:");

        Ok(TextCompletionRequest {
            prompt,
            max_tokens_to_sample: request.params.max_tokens.unwrap_or(self.default_max_tokens),
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            stop_sequences: &request.params.stop_sequences,
        })
    }
}

/// Decode a buffered `InvokeModel` body for either schema.
pub fn parse_response(body: &[u8]) -> Result<ProviderResponse, ProviderError> {
    let response: InvokeResponse = serde_json::from_slice(body)
        .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

    let text = match response.completion {
        Some(completion) => completion,
        None => response
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect(),
    };

    let usage = response.usage.unwrap_or_default();

    Ok(ProviderResponse {
        text,
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        finish_reason: response
            .stop_reason
            .as_deref()
            .map(FinishReason::from_stop_reason)
            .unwrap_or(FinishReason::Complete),
    })
}

/// Incremental decoder for `InvokeModelWithResponseStream` chunks.
///
/// Each Bedrock chunk carries exactly one JSON event. Messages-API events put
/// text in `delta.text`; text-completion events put it in `completion`. The
/// final event of both carries `amazon-bedrock-invocationMetrics`.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
    stop_reason: Option<String>,
}

impl StreamDecoder {
    /// Returns the text carried by the event, if any.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Option<String>, ProviderError> {
        let event: StreamEvent = serde_json::from_slice(chunk)
            .map_err(|e| ProviderError::ApiError(format!("Malformed stream event: {}", e)))?;

        if let Some(metrics) = event.invocation_metrics {
            self.input_tokens = metrics.input_token_count.or(self.input_tokens);
            self.output_tokens = metrics.output_token_count.or(self.output_tokens);
        }

        let (text, stop_reason) = match event.delta {
            Some(delta) => (delta.text, delta.stop_reason),
            None => (event.completion, event.stop_reason),
        };

        if stop_reason.is_some() {
            self.stop_reason = stop_reason;
        }

        Ok(text.filter(|t| !t.is_empty()))
    }

    pub fn finish(self) -> StreamChunk {
        StreamChunk::Complete {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            finish_reason: self
                .stop_reason
                .as_deref()
                .map(FinishReason::from_stop_reason)
                .unwrap_or(FinishReason::Complete),
        }
    }
}

/// Map an SDK error code onto the provider taxonomy.
pub fn classify_error_code(code: Option<&str>, message: String) -> ProviderError {
    match code {
        Some("ThrottlingException")
        | Some("ServiceQuotaExceededException")
        | Some("TooManyRequestsException") => ProviderError::RateLimited,
        Some("ValidationException") | Some("ResourceNotFoundException") => {
            ProviderError::InvalidRequest(message)
        }
        Some("AccessDeniedException") | Some("UnrecognizedClientException") => {
            ProviderError::AccessDenied(message)
        }
        _ => ProviderError::ApiError(message),
    }
}

fn classify_sdk_error<E, R>(err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();

    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            ProviderError::NetworkError(message)
        }
        _ => classify_error_code(err.code(), message),
    }
}

#[async_trait]
impl TextProvider for BedrockProvider {
    async fn generate(
        &self,
        model_id: &str,
        request: &ChatRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let body = self.build_body(model_id, request)?;

        tracing::debug!(
            model = %model_id,
            prompt_len = request.prompt_len(),
            "Invoking Bedrock model"
        );

        let output = self
            .client
            .invoke_model()
            .model_id(model_id)
            .content_type(JSON_CONTENT_TYPE)
            .accept(JSON_CONTENT_TYPE)
            .body(Blob::new(body))
            .send()
            .await
            .map_err(classify_sdk_error)?;

        parse_response(output.body().as_ref())
    }

    async fn generate_stream(
        &self,
        model_id: &str,
        request: &ChatRequest,
    ) -> Result<ProviderStream, ProviderError> {
        let body = self.build_body(model_id, request)?;

        tracing::debug!(
            model = %model_id,
            prompt_len = request.prompt_len(),
            "Starting Bedrock response stream"
        );

        let output = self
            .client
            .invoke_model_with_response_stream()
            .model_id(model_id)
            .content_type(JSON_CONTENT_TYPE)
            .accept(JSON_CONTENT_TYPE)
            .body(Blob::new(body))
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let mut events = output.body;
        let (tx, rx) = mpsc::channel(32);

        // Drain the event stream into the channel; a closed receiver means the
        // HTTP client went away or the relay gave up, so stop reading even if
        // the event stream has stalled.
        tokio::spawn(async move {
            let mut decoder = StreamDecoder::default();

            loop {
                let event = tokio::select! {
                    event = events.recv() => event,
                    _ = tx.closed() => {
                        tracing::debug!("Stream receiver dropped; abandoning Bedrock stream");
                        return;
                    }
                };

                match event {
                    Ok(Some(ResponseStream::Chunk(part))) => {
                        let Some(bytes) = part.bytes() else {
                            continue;
                        };

                        match decoder.decode(bytes.as_ref()) {
                            Ok(Some(text)) => {
                                if tx.send(Ok(StreamChunk::Text(text))).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        }
                    }
                    Ok(Some(other)) => {
                        tracing::debug!(event = ?other, "Ignoring unknown stream event");
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(classify_sdk_error(e))).await;
                        return;
                    }
                }
            }

            let _ = tx.send(Ok(decoder.finish())).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)) as ProviderStream)
    }
}

// ============================================================================
// Anthropic-on-Bedrock Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    anthropic_version: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "is_empty")]
    stop_sequences: &'a [String],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: Role,
    content: Vec<MessageContent<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum MessageContent<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
struct TextCompletionRequest<'a> {
    prompt: String,
    max_tokens_to_sample: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "is_empty")]
    stop_sequences: &'a [String],
}

fn is_empty(stop_sequences: &&[String]) -> bool {
    stop_sequences.is_empty()
}

/// Union of the Messages and text-completion response bodies.
#[derive(Debug, Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    completion: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    delta: Option<EventDelta>,
    #[serde(default)]
    completion: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default, rename = "amazon-bedrock-invocationMetrics")]
    invocation_metrics: Option<InvocationMetrics>,
}

#[derive(Debug, Deserialize)]
struct EventDelta {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvocationMetrics {
    input_token_count: Option<u32>,
    output_token_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::{ChatMessage, GenerationParams};
    use serde_json::{json, Value};

    fn provider() -> BedrockProvider {
        let sdk_config = aws_sdk_bedrockruntime::Config::builder()
            .behavior_version(aws_sdk_bedrockruntime::config::BehaviorVersion::latest())
            .region(aws_sdk_bedrockruntime::config::Region::new("us-west-2"))
            .build();
        BedrockProvider::new(
            Client::from_conf(sdk_config),
            &BedrockConfig::default(),
        )
    }

    fn body_json(model_id: &str, request: &ChatRequest) -> Value {
        serde_json::from_slice(&provider().build_body(model_id, request).unwrap()).unwrap()
    }

    #[test]
    fn test_model_family_detection() {
        assert_eq!(
            ModelFamily::from_model_id("anthropic.claude-3-haiku-20240307-v1:0").unwrap(),
            ModelFamily::Messages
        );
        assert_eq!(
            ModelFamily::from_model_id("us.anthropic.claude-3-5-sonnet-20240620-v1:0").unwrap(),
            ModelFamily::Messages
        );
        assert_eq!(
            ModelFamily::from_model_id("anthropic.claude-v2").unwrap(),
            ModelFamily::TextCompletion
        );
        assert!(ModelFamily::from_model_id("amazon.titan-text-express-v1").is_err());
    }

    #[test]
    fn test_messages_body_shape() {
        let request = ChatRequest {
            system: Some("be brief".into()),
            messages: vec![
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello"),
                ChatMessage::user("ping"),
            ],
            params: GenerationParams {
                temperature: Some(0.5),
                ..Default::default()
            },
        };

        let body = body_json("anthropic.claude-3-haiku-20240307-v1:0", &request);

        assert_eq!(body["anthropic_version"], "bedrock-2023-05-31");
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(
            body["messages"][2]["content"][0],
            json!({"type": "text", "text": "ping"})
        );
        assert!(body.get("stop_sequences").is_none());
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn test_image_block_is_base64_source() {
        let mut request = ChatRequest::single_turn("what is this?");
        request.messages[0].content.insert(
            0,
            ContentBlock::Image {
                media_type: "image/png".into(),
                data: "iVBORw0KGgo=".into(),
            },
        );

        let body = body_json("anthropic.claude-3-haiku-20240307-v1:0", &request);

        assert_eq!(
            body["messages"][0]["content"][0],
            json!({
                "type": "image",
                "source": {"type": "base64", "media_type": "image/png", "data": "iVBORw0KGgo="}
            })
        );
        assert_eq!(body["messages"][0]["content"][1]["text"], "what is this?");
    }

    #[test]
    fn test_text_completion_prompt() {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello"),
                ChatMessage::user("ping"),
            ],
            params: GenerationParams {
                max_tokens: Some(300),
                ..Default::default()
            },
            ..Default::default()
        };

        let body = body_json("anthropic.claude-v2", &request);

        assert_eq!(
            body["prompt"],
            "\n\nHuman: hi\n\nAssistant: hello\n\nHuman: ping\n\nAssistant:"
        );
        assert_eq!(body["max_tokens_to_sample"], 300);
    }

    #[test]
    fn test_text_completion_rejects_images() {
        let request = ChatRequest {
            messages: vec![ChatMessage {
                role: Role::User,
                content: vec![ContentBlock::Image {
                    media_type: "image/png".into(),
                    data: String::new(),
                }],
            }],
            ..Default::default()
        };

        let err = provider().build_body("anthropic.claude-v2", &request).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[test]
    fn test_parse_messages_response() {
        let body = json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "po"}, {"type": "text", "text": "ng"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 2}
        });

        let response = parse_response(body.to_string().as_bytes()).unwrap();
        assert_eq!(response.text, "pong");
        assert_eq!(response.input_tokens, Some(12));
        assert_eq!(response.output_tokens, Some(2));
        assert_eq!(response.finish_reason, FinishReason::Complete);
    }

    #[test]
    fn test_parse_text_completion_response() {
        let body = json!({"completion": " pong", "stop_reason": "max_tokens"});

        let response = parse_response(body.to_string().as_bytes()).unwrap();
        assert_eq!(response.text, " pong");
        assert_eq!(response.finish_reason, FinishReason::Length);
    }

    #[test]
    fn test_decoder_messages_events() {
        let events = [
            json!({"type": "message_start", "message": {"usage": {"input_tokens": 9}}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hel"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "lo"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 2}}),
            json!({"type": "message_stop", "amazon-bedrock-invocationMetrics": {"inputTokenCount": 9, "outputTokenCount": 2, "invocationLatency": 300, "firstByteLatency": 120}}),
        ];

        let mut decoder = StreamDecoder::default();
        let texts: Vec<String> = events
            .iter()
            .filter_map(|e| decoder.decode(e.to_string().as_bytes()).unwrap())
            .collect();

        assert_eq!(texts, vec!["Hel".to_string(), "lo".to_string()]);
        assert_eq!(
            decoder.finish(),
            StreamChunk::Complete {
                input_tokens: Some(9),
                output_tokens: Some(2),
                finish_reason: FinishReason::Complete,
            }
        );
    }

    #[test]
    fn test_decoder_text_completion_events() {
        let events = [
            json!({"completion": " Hello", "stop_reason": null}),
            json!({"completion": " world", "stop_reason": "stop_sequence",
                   "amazon-bedrock-invocationMetrics": {"inputTokenCount": 4, "outputTokenCount": 3}}),
        ];

        let mut decoder = StreamDecoder::default();
        let texts: Vec<String> = events
            .iter()
            .filter_map(|e| decoder.decode(e.to_string().as_bytes()).unwrap())
            .collect();

        assert_eq!(texts.concat(), " Hello world");
        assert_eq!(
            decoder.finish(),
            StreamChunk::Complete {
                input_tokens: Some(4),
                output_tokens: Some(3),
                finish_reason: FinishReason::StopSequence,
            }
        );
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        let mut decoder = StreamDecoder::default();
        assert!(decoder.decode(b"not json").is_err());
    }

    #[test]
    fn test_error_code_classification() {
        assert!(matches!(
            classify_error_code(Some("ThrottlingException"), String::new()),
            ProviderError::RateLimited
        ));
        assert!(matches!(
            classify_error_code(Some("ValidationException"), "bad model".into()),
            ProviderError::InvalidRequest(_)
        ));
        assert!(matches!(
            classify_error_code(Some("AccessDeniedException"), String::new()),
            ProviderError::AccessDenied(_)
        ));
        assert!(matches!(
            classify_error_code(None, String::new()),
            ProviderError::ApiError(_)
        ));
    }
}
