//! patchsmith: interactive LLM code-edit pipeline (library crate).
//!
//! Re-exports public modules for integration tests and the binary.

pub mod config;
pub mod constants;
pub mod context;
pub mod conversation;
pub mod declarations;
pub mod env;
pub mod files;
pub mod instructions;
pub mod interact;
pub mod models;
pub mod operator;
pub mod patch;
pub mod pipeline;
pub mod postprocess;
pub mod progress;
pub mod providers;
pub mod run;
pub mod selection;
pub mod summary;
pub mod test_runner;
