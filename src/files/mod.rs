//! File enumeration: which files under the project root are candidates
//! for context.
//!
//! Asks git for tracked plus untracked-but-not-ignored files and falls
//! back to a gitignore-aware directory walk when git is unavailable.

pub mod classify;
pub mod git;

use std::path::Path;

use ignore::WalkBuilder;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::TrackedFile;

/// Errors from file enumeration and the git wrapper.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("git command failed: {0}")]
    GitError(String),

    #[error("root directory does not exist: {0}")]
    RootNotFound(String),
}

/// Directory names never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".venv",
    "venv",
    "node_modules",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    "target",
    "build",
    "dist",
    "runs",
];

/// File name suffixes that are never context material.
pub const EXCLUDED_SUFFIXES: &[&str] = &[
    "package-lock.json",
    ".svg",
    ".jpg",
    ".jpeg",
    ".png",
    ".gif",
];

/// Whether a root-relative path survives the directory and suffix denylists.
pub fn is_candidate(relative: &str) -> bool {
    let mut segments = relative.split('/').peekable();
    while let Some(segment) = segments.next() {
        // The last segment is the file name itself.
        if segments.peek().is_some() && EXCLUDED_DIRS.contains(&segment) {
            return false;
        }
    }
    !EXCLUDED_SUFFIXES
        .iter()
        .any(|suffix| relative.ends_with(suffix))
}

/// Enumerate candidate files with their text classification.
///
/// Binary files are included with `is_text = false`; use
/// [`list_tracked_files`] for the text-only view.
pub async fn scan(root: &Path) -> Result<Vec<TrackedFile>, FileError> {
    if !root.is_dir() {
        return Err(FileError::RootNotFound(root.display().to_string()));
    }

    let relative_paths = match git::list_tracked_and_untracked(root).await {
        Ok(paths) => paths,
        Err(e) => {
            warn!(error = %e, "git listing unavailable, falling back to directory walk");
            walk(root)
        }
    };

    let mut files: Vec<TrackedFile> = relative_paths
        .into_iter()
        .filter(|rel| is_candidate(rel))
        .filter_map(|relative| {
            let absolute = root.join(&relative);
            // Deleted-but-still-indexed entries have nothing on disk.
            if !absolute.is_file() {
                return None;
            }
            let is_text = classify::is_text_file(&absolute);
            Some(TrackedFile {
                relative,
                absolute,
                is_text,
            })
        })
        .collect();
    files.sort();
    files.dedup();
    Ok(files)
}

/// Enumerate the text files under `root`, ordered by relative path.
pub async fn list_tracked_files(root: &Path) -> Result<Vec<TrackedFile>, FileError> {
    let all = scan(root).await?;
    let total = all.len();
    let text: Vec<TrackedFile> = all.into_iter().filter(|f| f.is_text).collect();
    info!(
        root = %root.display(),
        text = text.len(),
        total,
        "enumerated tracked files"
    );
    Ok(text)
}

/// Recursive walk honouring `.gitignore`, pruning excluded directories.
fn walk(root: &Path) -> Vec<String> {
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .require_git(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            !(is_dir
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| EXCLUDED_DIRS.contains(&name)))
        })
        .build();

    walker
        .flatten()
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .collect()
}
