//! Concatenates selected files into a single delimited context document.
//!
//! ```text
//! <preamble>
//!
//! ###FILENAME: <relative/path>
//! <filtered content>
//! ###END
//! ...
//! ###FILES PROCESSED:
//! <relative/path> (<N> lines)
//! ```

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{error, info};

use crate::config::ContextConfig;

/// Fixed opening sentence of every context document.
pub const PREAMBLE: &str = "This file contains my whole source code (excluding tests) concatenated into a single txt file. Comments and import have been excluded from the dump to save space. Each file is separated by ###.\n\n";

pub const FILE_MARKER: &str = "###FILENAME: ";
pub const END_MARKER: &str = "###END";
pub const MANIFEST_MARKER: &str = "###FILES PROCESSED:";

const LOCKFILE: &str = "package-lock.json";

static ENV_ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(\w+)=.*$").expect("valid regex"));

/// Strip noise from a file's content before it enters the context.
///
/// `.env` files have every value redacted. Everything else loses blank
/// lines and lines starting with `#`.
pub fn filter_content(relative: &str, text: &str) -> String {
    let file_name = relative.rsplit('/').next().unwrap_or(relative);
    if file_name == ".env" {
        return ENV_ASSIGNMENT
            .replace_all(text, "${1}=REDACTED")
            .trim()
            .to_string();
    }
    text.lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result of one assembly pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledContext {
    pub text: String,
    /// `(relative path, line count of the unfiltered file)` in output order.
    pub processed: Vec<(String, usize)>,
}

/// Builds context documents for files under one root.
pub struct ContextAssembler<'a> {
    root: &'a Path,
    config: &'a ContextConfig,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(root: &'a Path, config: &'a ContextConfig) -> Self {
        Self { root, config }
    }

    /// Whether a file takes part in concatenation.
    ///
    /// Requires an allow-listed extension, no `test` in the path unless
    /// tests are opted in, and not being a lockfile.
    pub fn should_include(&self, relative: &str) -> bool {
        let is_test = relative.to_lowercase().contains("test");
        (!is_test || self.config.include_tests)
            && self
                .config
                .extensions
                .iter()
                .any(|ext| relative.ends_with(ext.as_str()))
            && !relative.ends_with(LOCKFILE)
    }

    /// Concatenate `files` (root-relative) in the given order.
    ///
    /// Unreadable files are logged and left out of both the body and the
    /// manifest.
    pub async fn assemble(&self, files: &[String]) -> AssembledContext {
        let mut out = AssembledContext {
            text: PREAMBLE.to_string(),
            processed: Vec::new(),
        };

        for relative in files.iter().filter(|f| self.should_include(f)) {
            let bytes = match tokio::fs::read(self.root.join(relative)).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(path = %relative, error = %e, "error processing file");
                    continue;
                }
            };
            let content = String::from_utf8_lossy(&bytes);
            let filtered = filter_content(relative, &content);

            out.text.push_str(&format!("\n\n{FILE_MARKER}{relative}\n"));
            out.text.push_str(&filtered);
            if !filtered.ends_with('\n') {
                out.text.push('\n');
            }
            out.text.push_str(END_MARKER);
            out.text.push('\n');
            out.processed.push((relative.clone(), content.lines().count()));
        }

        out.text.push_str(&format!("\n\n{MANIFEST_MARKER}\n"));
        for (relative, lines) in &out.processed {
            out.text.push_str(&format!("{relative} ({lines} lines)\n"));
        }
        info!(files = out.processed.len(), "assembled context");
        out
    }
}
