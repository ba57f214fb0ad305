//! OpenAI-backed [`LlmGateway`]: Chat Completions for text, Embeddings API for vectors.
//!
//! Requires `OPENAI_API_KEY` (or explicit config, e.g. a custom base URL for
//! OpenAI-compatible providers). Model names come from [`env_config::EngineSettings`].

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
    },
    types::embeddings::{CreateEmbeddingRequest, EmbeddingInput},
    Client,
};
use async_trait::async_trait;
use tracing::debug;

use super::{LlmError, LlmGateway};

/// Classifies a provider error by its rendered text; the typed payload does not carry a
/// status code, so rate/overload detection is textual.
fn map_openai_err(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::ApiError(api) => {
            let rendered = api.to_string();
            let lowered = rendered.to_lowercase();
            if lowered.contains("rate limit") || lowered.contains("rate_limit") {
                LlmError::RateLimited(rendered)
            } else if lowered.contains("server_error") || lowered.contains("overloaded") {
                LlmError::Transport(rendered)
            } else {
                LlmError::Provider(rendered)
            }
        }
        other => LlmError::Transport(other.to_string()),
    }
}

/// OpenAI gateway. Build with defaults ([`OpenAiGateway::new`]) or a custom config.
pub struct OpenAiGateway {
    client: Client<OpenAIConfig>,
    chat_model: String,
    embedding_model: String,
}

impl OpenAiGateway {
    /// API key from `OPENAI_API_KEY` in the environment.
    pub fn new(chat_model: impl Into<String>, embedding_model: impl Into<String>) -> Self {
        Self::with_config(OpenAIConfig::new(), chat_model, embedding_model)
    }

    /// Custom config (API key, base URL) for OpenAI-compatible providers.
    pub fn with_config(
        config: OpenAIConfig,
        chat_model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::with_config(config),
            chat_model: chat_model.into(),
            embedding_model: embedding_model.into(),
        }
    }
}

#[async_trait]
impl LlmGateway for OpenAiGateway {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage::from(system)),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(user)),
        ];

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.chat_model.clone());
        args.messages(messages);
        args.temperature(temperature);
        if let Some(max) = max_tokens {
            args.max_completion_tokens(max);
        }
        let request = args
            .build()
            .map_err(|e| LlmError::Provider(format!("request build failed: {}", e)))?;

        debug!(model = %self.chat_model, temperature, "openai chat create");
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_err)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let request = CreateEmbeddingRequest {
            input: EmbeddingInput::String(text.to_string()),
            model: self.embedding_model.clone(),
            ..Default::default()
        };

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(map_openai_err)?;

        response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or(LlmError::EmptyResponse)
    }
}
