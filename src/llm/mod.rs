mod limits;
mod tokens;

pub mod anthropic;
pub mod openrouter;

pub use limits::ModelLimits;
pub use tokens::{BpeTokenizer, Tokenizer};

use crate::error::LlmError;
use crate::retry::{with_retry, RetryConfig};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[Message],
        system: Option<&str>,
        max_tokens: usize,
    ) -> Result<String, LlmError>;

    /// Identifier of the model every `chat` call is sent to.
    fn model(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Retries transient provider failures of the wrapped client.
pub struct RetryingClient {
    inner: Arc<dyn ModelClient>,
    config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn ModelClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl ModelClient for RetryingClient {
    async fn chat(
        &self,
        messages: &[Message],
        system: Option<&str>,
        max_tokens: usize,
    ) -> Result<String, LlmError> {
        let inner = self.inner.as_ref();
        with_retry(&self.config, move || inner.chat(messages, system, max_tokens)).await
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}
