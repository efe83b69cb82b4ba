//! Chat backends: the free-text channel the generator talks to.

use crate::error::{LaerError, Result};
use crate::openai::create_client_with_timeout;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::instrument;

/// A single system + user prompt exchange.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub model: String,
    pub temperature: f32,
    /// Ask the backend to constrain its reply to a JSON object.
    pub json_object: bool,
}

/// Trait for LLM chat backends.
///
/// Implementations return the raw reply text; nothing about its structure is guaranteed.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// OpenAI chat completions backend.
pub struct OpenAiBackend {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
}

impl OpenAiBackend {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: create_client_with_timeout(timeout)?,
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system.clone())
                .build()
                .map_err(|e| LaerError::OpenAI(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user.clone())
                .build()
                .map_err(|e| LaerError::OpenAI(e.to_string()))?
                .into(),
        ];

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&request.model)
            .messages(messages)
            .temperature(request.temperature);
        if request.json_object {
            args.response_format(ResponseFormat::JsonObject);
        }
        let chat_request = args.build().map_err(|e| LaerError::OpenAI(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| LaerError::OpenAI(format!("Failed to get completion: {}", e)))?;

        // An empty reply is still a reply; the generator decides whether it is usable.
        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}
