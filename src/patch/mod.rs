//! Patch application: tier selection, model call and writing results.

pub mod apply;
pub mod service;

use std::path::PathBuf;

use thiserror::Error;

use crate::providers::ProviderError;
use crate::run::RunDirError;

pub use apply::{ApplyOutcome, PatchApplier, guard_first_line, unified_diff};
pub use service::{PatchService, Tier, extract_updated_content, render_template, select_tier};

/// Errors from applying a single patch.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("{path} is too large to patch: {tokens} tokens, limit {limit}")]
    TooLarge {
        path: String,
        tokens: usize,
        limit: usize,
    },

    #[error("refusing to patch outside the project: {0}")]
    OutsideRoot(String),

    #[error("LLM response does not contain properly formatted updated content for {path}")]
    MalformedOutput { path: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    RunDir(#[from] RunDirError),
}

impl PatchError {
    /// Errors that must end the whole batch rather than one patch.
    pub fn aborts_batch(&self) -> bool {
        matches!(self, PatchError::Provider(ProviderError::Overloaded(_)))
    }
}
