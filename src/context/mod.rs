//! Context documents sent to the instruction model.
//!
//! [`assembler`] turns a file list into the delimited code dump; this
//! module wraps that dump with the project's coding standards,
//! requirements and answer-format instructions.

pub mod assembler;

use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use crate::constants;

pub use assembler::{AssembledContext, ContextAssembler, filter_content};

/// Built-in coding standards, overridable per project.
pub const DEFAULT_CODING_STANDARDS: &str = include_str!("../templates/coding-standards.yaml");

/// Built-in answer-format instructions, overridable per project.
pub const DEFAULT_INSTRUCTIONS: &str = include_str!("../templates/instructions.txt");

pub const CODING_STANDARDS_FILE: &str = "coding-standards.yaml";
pub const INSTRUCTIONS_FILE: &str = "instructions.txt";
pub const REQUIREMENTS_FILE: &str = "requirements.txt";
pub const REQUIREMENTS_MISSING: &str = "Requirements file not found";

/// Errors while gathering context text.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

/// Project text pieces that surround the smart context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTexts {
    pub coding_standards: String,
    pub requirements: String,
    pub instructions: String,
}

impl ProjectTexts {
    /// Load overrides from `<root>/.patchsmith/`, falling back to the
    /// embedded defaults, and `requirements.txt` from the root.
    pub async fn load(root: &Path) -> Result<Self, ContextError> {
        let project_dir = root.join(constants::PROJECT_DIR);
        Ok(Self {
            coding_standards: read_or_default(
                &project_dir.join(CODING_STANDARDS_FILE),
                DEFAULT_CODING_STANDARDS,
            )
            .await?,
            requirements: read_requirements(root).await?,
            instructions: read_or_default(&project_dir.join(INSTRUCTIONS_FILE), DEFAULT_INSTRUCTIONS)
                .await?,
        })
    }
}

async fn read_or_default(path: &Path, default: &str) -> Result<String, ContextError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            debug!(path = %path.display(), "using project override");
            Ok(content)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(default.to_string()),
        Err(source) => Err(ContextError::Read {
            path: path.display().to_string(),
            source,
        }),
    }
}

async fn read_requirements(root: &Path) -> Result<String, ContextError> {
    let path = root.join(REQUIREMENTS_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("requirements.txt not found, proceeding without requirements");
            Ok(REQUIREMENTS_MISSING.to_string())
        }
        Err(source) => Err(ContextError::Read {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Compose the first-turn context from the smart context and project texts.
pub fn build_initial_context(smart_context: &str, texts: &ProjectTexts) -> String {
    format!(
        "\n\n*** SMART CONTEXT ***\n\n{smart_context}\n\n*** CODING STANDARDS ***\n\n{}\n\n*** REQUIREMENTS ***\n{}\n\n\n*** INSTRUCTIONS ***\n\n{}",
        texts.coding_standards, texts.requirements, texts.instructions
    )
}
