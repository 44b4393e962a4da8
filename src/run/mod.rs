//! Per-invocation run directory holding every audit artifact.

use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info};

/// Errors creating or writing the run directory.
#[derive(Error, Debug)]
pub enum RunDirError {
    #[error("failed to create run directory {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("run directory not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Timestamp used for run directory names and reply artifacts.
pub fn timestamp() -> String {
    Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Compact timestamp used for selection conversation logs.
pub fn compact_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// `runs/<timestamp>/` directory for one pipeline invocation.
#[derive(Debug, Clone)]
pub struct RunDir {
    path: PathBuf,
}

impl RunDir {
    /// Create a fresh timestamped directory under `runs_root`.
    pub fn create(runs_root: &Path) -> Result<Self, RunDirError> {
        let path = runs_root.join(timestamp());
        std::fs::create_dir_all(&path).map_err(|source| RunDirError::Create {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "created run directory");
        Ok(Self { path })
    }

    /// Use an existing directory, e.g. when resuming.
    pub fn open(path: &Path) -> Result<Self, RunDirError> {
        if !path.is_dir() {
            return Err(RunDirError::NotFound(path.to_path_buf()));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, used as the branch name prefix.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn prompt_path(&self, turn: u32) -> PathBuf {
        self.file(&format!("prompt_{turn}.md"))
    }

    pub fn raw_instructions_path(&self, turn: u32) -> PathBuf {
        self.file(&format!("raw_instructions_turn_{turn}.md"))
    }

    pub fn test_results_path(&self, turn: u32) -> PathBuf {
        self.file(&format!("test_results_turn_{turn}.txt"))
    }

    pub fn post_processed_prompt_path(&self, turn: u32) -> PathBuf {
        self.file(&format!("post_processed_prompt_turn_{turn}.md"))
    }

    pub fn patches_dir(&self) -> PathBuf {
        self.file("patches")
    }

    pub fn new_files_dir(&self) -> PathBuf {
        self.file("new_files")
    }

    /// Write an artifact into the run directory, creating parents.
    pub fn write(&self, name: &str, content: &str) -> Result<PathBuf, RunDirError> {
        let path = self.file(name);
        write_creating_parents(&path, content)?;
        debug!(path = %path.display(), bytes = content.len(), "wrote run artifact");
        Ok(path)
    }

    pub fn read(&self, name: &str) -> Result<String, RunDirError> {
        read_to_string(&self.file(name))
    }

    /// Path of `prompt_{turn}.md`, created from the project's prompt
    /// template (or empty) when missing.
    pub fn ensure_prompt(&self, turn: u32, project_root: &Path) -> Result<PathBuf, RunDirError> {
        let path = self.prompt_path(turn);
        if !path.exists() {
            let template = prompt_template(project_root).unwrap_or_default();
            write_creating_parents(&path, &template)?;
            info!(path = %path.display(), "created new prompt file");
        }
        Ok(path)
    }

    /// Append `text` to an artifact, creating it when missing.
    pub fn append(&self, path: &Path, text: &str) -> Result<(), RunDirError> {
        use std::io::Write;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| RunDirError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        file.write_all(text.as_bytes())
            .map_err(|source| RunDirError::Write {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Flat artifact name for a root-relative path: `src/a/utils.py` becomes
/// `src__a__utils.py`, so files sharing a basename keep separate artifacts.
pub fn artifact_name(relative: &str) -> String {
    relative
        .trim_start_matches("./")
        .trim_start_matches('/')
        .replace(['/', '\\'], "__")
}

/// Non-empty `prompt_template.md` from the project root.
pub fn prompt_template(project_root: &Path) -> Option<String> {
    std::fs::read_to_string(project_root.join(crate::constants::PROMPT_TEMPLATE_FILE))
        .ok()
        .filter(|t| !t.is_empty())
}

/// Write `content` to `path`, creating missing parent directories.
pub fn write_creating_parents(path: &Path, content: &str) -> Result<(), RunDirError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| RunDirError::Create {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, content).map_err(|source| RunDirError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_to_string(path: &Path) -> Result<String, RunDirError> {
    std::fs::read_to_string(path).map_err(|source| RunDirError::Read {
        path: path.to_path_buf(),
        source,
    })
}
