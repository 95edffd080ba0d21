use crate::error::LlmError;
use crate::llm::{Message, ModelClient, Role};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn with_api_key(api_key: impl Into<String>, timeout_secs: u64) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: SecretString::from(api_key.into()),
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: ANTHROPIC_API_URL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Anthropic takes the system prompt out of band; system-role messages are
    /// folded into it after the explicit prompt.
    fn merged_system(messages: &[Message], system: Option<&str>) -> Option<String> {
        let parts: Vec<&str> = system
            .into_iter()
            .chain(
                messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(|m| m.content.as_str()),
            )
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn chat(
        &self,
        messages: &[Message],
        system: Option<&str>,
        max_tokens: usize,
    ) -> Result<String, LlmError> {
        let api_messages: Vec<ApiMessage> = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| ApiMessage {
                role: "user",
                content: &m.content,
            })
            .collect();

        let request = ApiRequest {
            model: &self.model,
            max_tokens,
            temperature: 0.0,
            messages: api_messages,
            system: Self::merged_system(messages, system),
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("x-api-key", self.api_key.expose_secret())
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
                "Anthropic rejected the API key".to_string(),
            ));
        }
        if status.is_server_error() {
            return Err(LlmError::Unavailable {
                provider: "anthropic".to_string(),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::InvalidResponse(format!(
                "API error ({}): {}",
                status, body
            )));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Invalid response: {}", e)))?;

        if let Some(usage) = &api_response.usage {
            tracing::info!(
                model = %self.model,
                "Number of tokens used: {}",
                usage.input_tokens + usage.output_tokens
            );
        }

        let text = api_response
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            Err(LlmError::InvalidResponse(
                "Unexpected response format: Expected text block".to_string(),
            ))
        } else {
            Ok(text)
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}
