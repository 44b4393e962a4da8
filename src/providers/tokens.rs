//! Token counting through Anthropic's `count_tokens` endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::TokenConfig;

use super::{ProviderError, TokenCounter, api_error};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct CountRequest<'a> {
    model: &'a str,
    messages: [CountMessage<'a>; 1],
}

#[derive(Serialize)]
struct CountMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CountResponse {
    input_tokens: usize,
}

/// Counts tokens by asking the provider; never estimates locally.
pub struct AnthropicTokenCounter {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl AnthropicTokenCounter {
    pub fn new(config: &TokenConfig, api_key: Option<String>) -> Result<Self, ProviderError> {
        let api_key = api_key.ok_or_else(|| {
            ProviderError::NotConfigured(
                "token counting needs an Anthropic API key (ANTHROPIC_API_KEY)".to_string(),
            )
        })?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("patchsmith/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1/messages/count_tokens",
                config.base_url.trim_end_matches('/')
            ),
            model: config.model.clone(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TokenCounter for AnthropicTokenCounter {
    async fn count(&self, text: &str) -> Result<usize, ProviderError> {
        // The endpoint rejects empty content.
        if text.is_empty() {
            return Ok(0);
        }

        let body = CountRequest {
            model: &self.model,
            messages: [CountMessage {
                role: "user",
                content: text,
            }],
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| api_error(format!("token count request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(api_error(format!("token count failed ({status}): {detail}")));
        }

        let parsed: CountResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("invalid token count response: {e}")))?;
        Ok(parsed.input_tokens)
    }
}
