//! Configuration loading and layering.
//!
//! Handles `.patchsmith.toml` loading, environment variable resolution,
//! and the section types threaded through the pipeline.

pub mod loader;

pub use loader::{
    Config, ConfigError, ContextConfig, MatchStrategy, PipelineConfig, ProviderConfig,
    TierConfig, TokenConfig,
};
