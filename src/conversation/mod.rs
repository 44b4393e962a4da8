//! Conversation history and the chat turn itself.

pub mod engine;
pub mod state;

use std::path::PathBuf;

use thiserror::Error;

use crate::context::ContextError;
use crate::models::Role;
use crate::providers::ProviderError;
use crate::run::RunDirError;
use crate::selection::SelectionError;

pub use engine::{CONTEXT_ACKNOWLEDGEMENT, ChatEngine, wrap_context};
pub use state::{ConversationState, validate_alternation};

/// Errors from loading, saving or advancing a conversation.
#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("failed to read conversation state {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write conversation state {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid conversation state: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("conversation state version {0} is newer than this build supports")]
    UnsupportedVersion(u64),

    #[error("message {index} breaks user/assistant alternation (second {role:?} in a row)")]
    Alternation { index: usize, role: Role },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    RunDir(#[from] RunDirError),
}

impl ConversationError {
    /// The model failure behind this error, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            ConversationError::Provider(e)
            | ConversationError::Selection(SelectionError::Provider(e)) => Some(e),
            _ => None,
        }
    }

    /// Provider failures worth offering a retry for.
    pub fn is_retryable(&self) -> bool {
        self.provider_error().is_some_and(crate::providers::is_retryable)
    }
}
