//! Language-model and token-counting collaborators.
//!
//! The pipeline only talks to the [`LanguageModel`] and [`TokenCounter`]
//! traits; rig-core and the counting endpoint sit behind them so tests can
//! substitute scripted implementations.

pub mod rig;
pub mod tokens;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ChatMessage, Role};

/// Maximum number of attempts a caller-level retry policy should make.
pub const MAX_RETRIES: u32 = 5;

/// Initial backoff delay between retries.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(10);

/// Maximum backoff delay between retries.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Errors from a model or counting call.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider is saturated (HTTP 529 or an "overloaded" body).
    #[error("LLM provider overloaded: {0}")]
    Overloaded(String),

    #[error("LLM API error: {0}")]
    ApiError(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("received an empty response from the LLM provider")]
    EmptyResponse,

    #[error("no user message to send")]
    NoPrompt,
}

/// A chat-completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send the ordered conversation and return the reply text.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
    ) -> Result<String, ProviderError>;

    /// Model identifier, used to label audit artifacts.
    fn model(&self) -> &str;
}

/// External token counting service.
#[async_trait]
pub trait TokenCounter: Send + Sync {
    async fn count(&self, text: &str) -> Result<usize, ProviderError>;
}

/// Normalise a conversation before sending it.
///
/// Empty messages are dropped and consecutive messages from the same role
/// are merged with a blank line, since chat APIs reject both.
pub fn prepare_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut prepared: Vec<ChatMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        if message.content.trim().is_empty() {
            continue;
        }
        match prepared.last_mut() {
            Some(last) if last.role == message.role => {
                last.content.push_str("\n\n");
                last.content.push_str(&message.content);
            }
            _ => prepared.push(message.clone()),
        }
    }
    prepared
}

/// Split a prepared conversation into history and the final user prompt.
pub fn split_prompt(messages: &[ChatMessage]) -> Result<(&[ChatMessage], &ChatMessage), ProviderError> {
    match messages.split_last() {
        Some((last, history)) if last.role == Role::User => Ok((history, last)),
        _ => Err(ProviderError::NoPrompt),
    }
}

/// Map a raw API failure message onto the error taxonomy.
pub fn api_error(message: String) -> ProviderError {
    let lower = message.to_lowercase();
    if lower.contains("529") || lower.contains("overloaded") {
        ProviderError::Overloaded(message)
    } else {
        ProviderError::ApiError(message)
    }
}

/// Check whether a provider error is transient and worth retrying.
pub fn is_retryable(err: &ProviderError) -> bool {
    classify_error(err).is_some()
}

/// Short, user-facing description of a transient error.
///
/// Returns `None` for errors a retry would not fix.
pub fn classify_error(err: &ProviderError) -> Option<&'static str> {
    match err {
        ProviderError::Overloaded(_) => Some("API overloaded"),
        ProviderError::ApiError(msg) => {
            let msg_lower = msg.to_lowercase();
            if msg_lower.contains("429")
                || msg_lower.contains("rate limit")
                || msg_lower.contains("too many requests")
            {
                Some("Rate limited by API")
            } else if msg_lower.contains("503") || msg_lower.contains("service unavailable") {
                Some("High model load")
            } else if msg_lower.contains("502") {
                Some("API gateway error")
            } else if msg_lower.contains("timeout") || msg_lower.contains("timed out") {
                Some("Request timed out")
            } else if msg_lower.contains("connection") {
                Some("Connection error")
            } else {
                None
            }
        }
        ProviderError::NotConfigured(_) | ProviderError::EmptyResponse | ProviderError::NoPrompt => {
            None
        }
    }
}

/// Backoff before retry `attempt` (0-based): doubling from 10s, capped at 60s.
pub fn retry_backoff(attempt: u32) -> Duration {
    let backoff = INITIAL_BACKOFF.saturating_mul(2u32.saturating_pow(attempt));
    backoff.min(MAX_BACKOFF)
}
