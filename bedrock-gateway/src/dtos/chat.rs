use crate::services::providers::{ChatMessage, ChatRequest, ContentBlock, GenerationParams, Role};
use serde::Deserialize;
use service_core::error::AppError;

/// Chat form posted by the Haiku and Claude v2 pages.
#[derive(Debug, Default, Deserialize)]
pub struct ChatInput {
    #[serde(default, alias = "message", alias = "question")]
    pub prompt: Option<String>,
    /// Earlier turns of the conversation, oldest first.
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub role: Role,
    pub content: String,
}

impl ChatInput {
    /// Build the provider request.
    ///
    /// Blank turns are dropped and adjacent turns from the same speaker are
    /// merged, so the result alternates, starts with a user turn and ends
    /// with a non-empty user turn.
    pub fn into_chat_request(self) -> Result<ChatRequest, AppError> {
        let prompt = self
            .prompt
            .filter(|p| !p.trim().is_empty())
            .map(|p| InboundMessage {
                role: Role::User,
                content: p,
            });

        let mut messages: Vec<ChatMessage> = Vec::with_capacity(self.messages.len() + 1);
        for turn in self
            .messages
            .into_iter()
            .chain(prompt)
            .filter(|m| !m.content.trim().is_empty())
        {
            match messages.last_mut() {
                Some(last) if last.role == turn.role => {
                    last.content.push(ContentBlock::Text(turn.content));
                }
                _ => messages.push(match turn.role {
                    Role::User => ChatMessage::user(turn.content),
                    Role::Assistant => ChatMessage::assistant(turn.content),
                }),
            }
        }

        if messages.first().is_some_and(|first| first.role != Role::User) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Conversation must start with a user turn"
            )));
        }

        match messages.last() {
            Some(last) if last.role == Role::User => {}
            _ => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "A non-empty prompt is required"
                )))
            }
        }

        Ok(ChatRequest {
            system: self.system.filter(|s| !s.trim().is_empty()),
            messages,
            params: GenerationParams {
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                top_p: self.top_p,
                stop_sequences: Vec::new(),
            },
        })
    }
}
