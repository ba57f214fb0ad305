//! LLM gateway abstraction: chat completion, JSON-mode extraction, and embeddings.
//!
//! Every LLM-backed component (resolver, planner, judge, healer) talks to one
//! [`LlmGateway`] trait so tests substitute deterministic fakes. Implementations:
//! [`MockGateway`] (canned replies), [`OpenAiGateway`] (real API), and the
//! [`RetryingGateway`] decorator that adds the transient retry and the process-wide
//! concurrency limit.

mod extract;
mod mock;
mod openai;
mod retry;

pub use extract::extract_json_object;
pub use mock::{deterministic_embedding, MockGateway, RecordedPrompt};
pub use openai::OpenAiGateway;
pub use retry::RetryingGateway;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Gateway failure. `is_transient` marks the cases worth one retry.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network-level failure reaching the provider.
    #[error("llm transport: {0}")]
    Transport(String),

    /// Provider rejected the call for rate or capacity reasons.
    #[error("llm rate limited: {0}")]
    RateLimited(String),

    /// Provider returned a non-retryable error (bad request, auth, model).
    #[error("llm provider: {0}")]
    Provider(String),

    /// Completion arrived but carried no usable content.
    #[error("llm returned empty response")]
    EmptyResponse,

    /// JSON mode could not extract or decode an object from the reply.
    #[error("llm returned invalid json: {0}")]
    InvalidJson(String),
}

impl LlmError {
    /// Transient errors (network, rate-limit, provider overload) get one retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimited(_))
    }
}

/// Chat-completion + embedding oracle.
///
/// `json` has a default implementation on top of `chat`: it extracts the largest
/// balanced `{...}` region before decoding, so prose-wrapped replies still parse.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// One chat completion; returns the assistant text.
    async fn chat(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError>;

    /// Fixed-dimension embedding of the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// Chat completion decoded as a JSON object.
    async fn json(&self, system: &str, user: &str, temperature: f32) -> Result<Value, LlmError> {
        let raw = self.chat(system, user, temperature, None).await?;
        let region = extract_json_object(&raw).ok_or_else(|| {
            let mut preview = raw.trim().to_string();
            preview.truncate(200);
            LlmError::InvalidJson(format!("no balanced object in reply: {}", preview))
        })?;
        serde_json::from_str(region).map_err(|e| LlmError::InvalidJson(e.to_string()))
    }
}
