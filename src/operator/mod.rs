//! Writes new files, saves bash scripts and stages patch descriptions.
//!
//! Bash scripts are saved under `<root>/bash_scripts/` and never run.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{error, info};

use crate::models::{BashScriptInstruction, InstructionSet, NewFileInstruction, PatchInstruction};
use crate::run::{self, RunDir, RunDirError};

pub const BASH_SCRIPTS_DIR: &str = "bash_scripts";

/// Errors from file operations.
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("refusing to write outside the project: {0}")]
    OutsideRoot(String),

    #[error(transparent)]
    Io(#[from] RunDirError),
}

/// Resolve a model-supplied relative path under `root`.
///
/// Absolute paths and `..` components are rejected.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, OperatorError> {
    let path = Path::new(relative);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.trim().is_empty() || escapes {
        return Err(OperatorError::OutsideRoot(relative.to_string()));
    }
    Ok(root.join(path))
}

/// What a batch of file operations produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperatorReport {
    pub created: Vec<PathBuf>,
    pub scripts: Vec<PathBuf>,
    pub staged: Vec<PathBuf>,
    /// `(target, error)` for every operation that failed.
    pub failed: Vec<(String, String)>,
}

/// Performs file operations for one run.
pub struct FileOperator<'a> {
    root: &'a Path,
    run: &'a RunDir,
}

impl<'a> FileOperator<'a> {
    pub fn new(root: &'a Path, run: &'a RunDir) -> Self {
        Self { root, run }
    }

    /// Write `patches/<flat path>.diff` and mark the patch as staged.
    pub fn stage_patch(&self, patch: &mut PatchInstruction) -> Result<PathBuf, OperatorError> {
        let content = format!(
            "Original file: {}\n```diff\n{}\n```\n",
            patch.file_path, patch.patch_content
        );
        let staged = self
            .run
            .write(&format!("patches/{}.diff", run::artifact_name(&patch.file_path)), &content)?;
        info!(path = %staged.display(), "staged patch");
        patch.processed_path = Some(staged.clone());
        Ok(staged)
    }

    /// Create a file under the root and keep a copy in `new_files/`.
    pub fn create_new_file(&self, file: &NewFileInstruction) -> Result<PathBuf, OperatorError> {
        let target = resolve_within(self.root, &file.file_path)?;
        self.run.write(
            &format!("new_files/{}", run::artifact_name(&file.file_path)),
            &file.content,
        )?;
        run::write_creating_parents(&target, &file.content)?;
        info!(path = %target.display(), "created new file");
        Ok(target)
    }

    pub fn save_bash_script(&self, script: &BashScriptInstruction) -> Result<PathBuf, OperatorError> {
        let target = resolve_within(&self.root.join(BASH_SCRIPTS_DIR), &script.script_name)?;
        run::write_creating_parents(&target, &script.script_content)?;
        info!(path = %target.display(), "saved bash script");
        Ok(target)
    }

    /// Stage patches, create new files and save scripts.
    ///
    /// A failing operation is logged and the rest still run.
    pub fn process(&self, set: &mut InstructionSet) -> OperatorReport {
        let mut report = OperatorReport::default();
        for patch in &mut set.patches {
            match self.stage_patch(patch) {
                Ok(path) => report.staged.push(path),
                Err(e) => Self::record_failure(&mut report, &patch.file_path, e),
            }
        }
        for file in &set.new_files {
            match self.create_new_file(file) {
                Ok(path) => report.created.push(path),
                Err(e) => Self::record_failure(&mut report, &file.file_path, e),
            }
        }
        for script in &set.bash_scripts {
            match self.save_bash_script(script) {
                Ok(path) => report.scripts.push(path),
                Err(e) => Self::record_failure(&mut report, &script.script_name, e),
            }
        }
        report
    }

    fn record_failure(report: &mut OperatorReport, target: &str, err: OperatorError) {
        error!(target, error = %err, "file operation failed");
        report.failed.push((target.to_string(), err.to_string()));
    }
}
