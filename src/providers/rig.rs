//! rig-core integration for chat completions.
//!
//! Uses rig-core's provider clients and Agent abstraction for multi-provider
//! support. Currently supports: Anthropic, OpenAI, Cohere, Gemini, Perplexity,
//! DeepSeek, xAI, Groq, and any OpenAI-compatible API.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::{Chat, Message};
use rig::providers;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::models::{ChatMessage, ProviderName, Role};

use super::{LanguageModel, ProviderError, api_error, prepare_messages, split_prompt};

/// Default completion budget when none is given.
pub const DEFAULT_MAX_TOKENS: u64 = 8192;

/// Completion budget for the fast tier.
pub const FAST_MAX_TOKENS: u64 = 4096;

/// Build a chat agent from a rig-core client and send the conversation.
macro_rules! chat_simple {
    ($client:expr, $model:expr, $system:expr, $max_tokens:expr, $prompt:expr, $history:expr, $label:expr) => {{
        let agent = $client
            .agent($model)
            .preamble($system)
            .temperature(0.0)
            .max_tokens($max_tokens)
            .build();
        agent
            .chat($prompt, $history)
            .await
            .map_err(|e| api_error(format!("{} API error: {e}", $label)))
    }};
}

/// Create a rig-core client using the `Client::new(api_key)` convention.
macro_rules! new_client {
    ($provider_mod:path, $api_key:expr, $label:expr) => {{
        <$provider_mod>::new($api_key).map_err(|e| {
            ProviderError::NotConfigured(format!("failed to create {} client: {e}", $label))
        })
    }};
}

/// rig-core backed language model bound to one model name.
pub struct RigProvider {
    config: ProviderConfig,
    max_tokens: u64,
}

impl RigProvider {
    /// Create a provider for `config.model`.
    pub fn new(config: ProviderConfig, max_tokens: u64) -> Result<Self, ProviderError> {
        if config.api_key.is_none() {
            return Err(ProviderError::NotConfigured(format!(
                "no API key found for provider '{}'. Set {} or {}.",
                config.name,
                crate::constants::ENV_API_KEY,
                config.name.api_key_env_var(),
            )));
        }
        if config.name.requires_base_url() && config.base_url.is_none() {
            return Err(ProviderError::NotConfigured(
                "openai-compatible provider requires base_url to be set".to_string(),
            ));
        }
        Ok(Self { config, max_tokens })
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("missing API key".to_string()))
    }

    /// Build an OpenAI-style client, optionally with a custom base URL.
    fn build_openai_client(
        &self,
        api_key: &str,
    ) -> Result<providers::openai::CompletionsClient, ProviderError> {
        let mut builder = providers::openai::CompletionsClient::builder().api_key(api_key);
        if let Some(ref base_url) = self.config.base_url {
            builder = builder.base_url(base_url);
        }
        builder.build().map_err(|e| {
            ProviderError::NotConfigured(format!("failed to create OpenAI client: {e}"))
        })
    }

    async fn call_rig(
        &self,
        system: &str,
        prompt: Message,
        history: Vec<Message>,
    ) -> Result<String, ProviderError> {
        let api_key = self.api_key()?;
        let model = self.config.model.as_str();
        let max_tokens = self.max_tokens;

        match self.config.name {
            ProviderName::Anthropic => {
                let client: providers::anthropic::Client = providers::anthropic::Client::builder()
                    .api_key(api_key)
                    .build()
                    .map_err(|e| {
                        ProviderError::NotConfigured(format!(
                            "failed to create Anthropic client: {e}"
                        ))
                    })?;
                chat_simple!(client, model, system, max_tokens, prompt, history, "Anthropic")
            }
            ProviderName::OpenAI | ProviderName::OpenAICompatible => {
                let client = self.build_openai_client(api_key)?;
                chat_simple!(client, model, system, max_tokens, prompt, history, "OpenAI")
            }
            ProviderName::Cohere => {
                let client = new_client!(providers::cohere::Client, api_key, "Cohere")?;
                chat_simple!(client, model, system, max_tokens, prompt, history, "Cohere")
            }
            ProviderName::Gemini => {
                let client = new_client!(providers::gemini::Client, api_key, "Gemini")?;
                chat_simple!(client, model, system, max_tokens, prompt, history, "Gemini")
            }
            ProviderName::Perplexity => {
                let client = new_client!(providers::perplexity::Client, api_key, "Perplexity")?;
                chat_simple!(client, model, system, max_tokens, prompt, history, "Perplexity")
            }
            ProviderName::DeepSeek => {
                let client = new_client!(providers::deepseek::Client, api_key, "DeepSeek")?;
                chat_simple!(client, model, system, max_tokens, prompt, history, "DeepSeek")
            }
            ProviderName::XAI => {
                let client = new_client!(providers::xai::Client, api_key, "xAI")?;
                chat_simple!(client, model, system, max_tokens, prompt, history, "xAI")
            }
            ProviderName::Groq => {
                let client = new_client!(providers::groq::Client, api_key, "Groq")?;
                chat_simple!(client, model, system, max_tokens, prompt, history, "Groq")
            }
        }
    }
}

fn to_rig(message: &ChatMessage) -> Message {
    match message.role {
        Role::User => Message::user(message.content.clone()),
        Role::Assistant => Message::assistant(message.content.clone()),
    }
}

#[async_trait]
impl LanguageModel for RigProvider {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
    ) -> Result<String, ProviderError> {
        let prepared = prepare_messages(messages);
        let (history, prompt) = split_prompt(&prepared)?;
        debug!(
            model = %self.config.model,
            history = history.len(),
            prompt_chars = prompt.content.len(),
            "sending chat request"
        );

        let response = self
            .call_rig(
                system.unwrap_or_default(),
                to_rig(prompt),
                history.iter().map(to_rig).collect(),
            )
            .await?;

        if response.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(response)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
