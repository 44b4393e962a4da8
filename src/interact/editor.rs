//! External editor invocation.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use super::InputError;

/// Opens files for the user to edit and blocks until they are done.
#[async_trait]
pub trait Editor: Send + Sync {
    async fn edit(&self, path: &Path) -> Result<(), InputError>;

    /// Show two files side by side. Editors without a diff view do nothing.
    async fn diff(&self, _left: &Path, _right: &Path) -> Result<(), InputError> {
        Ok(())
    }
}

/// Short names accepted for common editors.
const ALIASES: &[(&str, &str)] = &[
    ("vscode", "code"),
    ("cursor", "cursor"),
    ("vim", "vim"),
    ("pycharm", "pycharm"),
    ("notepad", "notepad"),
    ("textedit", "open -a TextEdit"),
    ("nano", "nano"),
    ("xcode", "xed"),
    ("eclipse", "eclipse"),
    ("android_studio", "studio"),
];

/// GUI editors that return immediately unless told to wait.
const NEEDS_WAIT: &[&str] = &["code", "cursor", "subl", "zed"];

/// Resolve an editor alias to its command line.
pub fn resolve_editor(name: &str) -> String {
    let name = name.trim();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, command)| command.to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Runs a configured editor command.
#[derive(Debug, Clone)]
pub struct CommandEditor {
    command: String,
}

impl CommandEditor {
    pub fn new(editor: &str) -> Self {
        Self {
            command: resolve_editor(editor),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Program and leading arguments, with `--wait` for GUI editors.
    fn invocation(&self) -> Result<(String, Vec<String>), InputError> {
        let mut parts = self.command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(InputError::EmptyEditor)?;
        let mut args: Vec<String> = parts.collect();
        if NEEDS_WAIT.contains(&program.as_str()) {
            args.push("--wait".to_string());
        }
        Ok((program, args))
    }

    fn supports_diff(&self) -> bool {
        self.invocation()
            .is_ok_and(|(program, _)| matches!(program.as_str(), "code" | "cursor"))
    }

    async fn run(&self, extra: &[&Path], diff: bool) -> Result<(), InputError> {
        let (program, mut args) = self.invocation()?;
        if diff {
            args.push("--diff".to_string());
        }
        args.extend(extra.iter().map(|p| p.display().to_string()));
        debug!(%program, ?args, "launching editor");

        let status = tokio::process::Command::new(&program)
            .args(&args)
            .status()
            .await
            .map_err(|source| InputError::EditorLaunch {
                command: self.command.clone(),
                source,
            })?;
        if !status.success() {
            return Err(InputError::EditorExit {
                command: self.command.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Editor for CommandEditor {
    async fn edit(&self, path: &Path) -> Result<(), InputError> {
        info!(path = %path.display(), editor = %self.command, "opening file for editing");
        self.run(&[path], false).await
    }

    async fn diff(&self, left: &Path, right: &Path) -> Result<(), InputError> {
        if !self.supports_diff() {
            debug!(editor = %self.command, "editor has no diff view");
            return Ok(());
        }
        self.run(&[left, right], true).await
    }
}
