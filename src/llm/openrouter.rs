use crate::error::LlmError;
use crate::llm::{Message, ModelClient};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI-compatible chat completions client pointed at OpenRouter.
pub struct OpenRouterClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: SecretString::from(api_key.into()),
            base_url: base_url.into(),
            model: "anthropic/claude-3.5-sonnet".to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[async_trait]
impl ModelClient for OpenRouterClient {
    async fn chat(
        &self,
        messages: &[Message],
        system: Option<&str>,
        max_tokens: usize,
    ) -> Result<String, LlmError> {
        let system_message = system.map(Message::system);
        let chat_messages: Vec<ChatMessage> = system_message
            .iter()
            .chain(messages.iter())
            .map(|m| ChatMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect();

        let request = ChatRequest {
            model: &self.model,
            messages: chat_messages,
            max_tokens,
            temperature: 0.0,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(LlmError::Network)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited {
                retry_after_ms: 60000,
            });
        }
        if status.as_u16() == 401 {
            return Err(LlmError::AuthenticationFailed(
                "OpenRouter rejected the API key".to_string(),
            ));
        }
        if status.is_server_error() {
            return Err(LlmError::Unavailable {
                provider: "openrouter".to_string(),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::InvalidResponse(format!(
                "API error ({}): {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Invalid response: {}", e)))?;

        match &chat_response.usage {
            Some(usage) => tracing::info!(
                model = %self.model,
                "Number of tokens used: {}",
                usage.prompt_tokens + usage.completion_tokens
            ),
            None => tracing::info!(model = %self.model, "LLM did not output usage statistics"),
        }

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
