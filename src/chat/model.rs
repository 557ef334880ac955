//! Chat completion interface.

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::{AnamneseError, Result};

use super::transcript::{Role, Turn};

/// Generates an assistant reply from a system prompt and conversation turns.
///
/// Implementations are stateless; the caller decides what the model sees on
/// every call.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn reply(&self, system: &str, turns: &[Turn]) -> Result<Turn>;
}

/// Chat model backed by the OpenAI chat completions API.
pub struct OpenAIChatModel {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAIChatModel {
    pub fn new(model: &str) -> Self {
        Self {
            client: crate::openai::create_client(),
            model: model.to_string(),
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    #[instrument(skip(self, system, turns), fields(model = %self.model, turns = turns.len()))]
    async fn reply(&self, system: &str, turns: &[Turn]) -> Result<Turn> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(turns.len() + 1);
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| AnamneseError::Chat(e.to_string()))?
                .into(),
        );
        for turn in turns {
            let message = match turn.role {
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.as_str())
                    .build()
                    .map_err(|e| AnamneseError::Chat(e.to_string()))?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content.as_str())
                    .build()
                    .map_err(|e| AnamneseError::Chat(e.to_string()))?
                    .into(),
            };
            messages.push(message);
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(|e| AnamneseError::Chat(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AnamneseError::OpenAI(format!("Chat API error: {}", e)))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AnamneseError::Chat("Empty response from model".to_string()))?;

        debug!(chars = content.len(), "Received model reply");
        Ok(Turn::assistant(content))
    }
}
