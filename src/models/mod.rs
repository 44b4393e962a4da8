//! Shared types used across all modules.
//!
//! Tracked files, declarations, edit instructions and chat messages live
//! here so the enumerator, selector, parser and pipeline can exchange
//! them without reaching into each other's internals.

pub mod declaration;
pub mod files;
pub mod instruction;
pub mod message;

use serde::{Deserialize, Serialize};

pub use declaration::{Declaration, DeclarationKind};
pub use files::TrackedFile;
pub use instruction::{
    ActionType, BashScriptInstruction, EditInstruction, InstructionSet, LlmReply,
    NewFileInstruction, ParsedInstructionBlock, PatchInstruction,
};
pub use message::{ChatMessage, Role};

/// LLM backends reachable through rig-core.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderName {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAI,
    Cohere,
    Gemini,
    Perplexity,
    #[serde(rename = "deepseek")]
    #[strum(serialize = "deepseek")]
    DeepSeek,
    #[serde(rename = "xai")]
    #[strum(serialize = "xai")]
    XAI,
    Groq,
    /// Any OpenAI-compatible API (Ollama, vLLM, local gateways).
    #[serde(rename = "openai-compatible")]
    #[strum(serialize = "openai-compatible")]
    OpenAICompatible,
}

impl ProviderName {
    /// Provider-specific API key variable consulted when the generic one is unset.
    pub fn api_key_env_var(self) -> &'static str {
        match self {
            ProviderName::Anthropic => "ANTHROPIC_API_KEY",
            ProviderName::OpenAI | ProviderName::OpenAICompatible => "OPENAI_API_KEY",
            ProviderName::Cohere => "COHERE_API_KEY",
            ProviderName::Gemini => "GEMINI_API_KEY",
            ProviderName::Perplexity => "PERPLEXITY_API_KEY",
            ProviderName::DeepSeek => "DEEPSEEK_API_KEY",
            ProviderName::XAI => "XAI_API_KEY",
            ProviderName::Groq => "GROQ_API_KEY",
        }
    }

    /// Whether requests must go to an explicitly configured base URL.
    pub fn requires_base_url(self) -> bool {
        matches!(self, ProviderName::OpenAICompatible)
    }

    /// Parse a provider name with a message listing the valid choices.
    pub fn parse_with_hint(raw: &str) -> Result<Self, String> {
        raw.trim().parse::<ProviderName>().map_err(|_| {
            format!(
                "unsupported provider: '{raw}'. Supported: {}",
                <Self as strum::VariantNames>::VARIANTS.join(", ")
            )
        })
    }
}
