//! Git CLI wrapper.
//!
//! Shells out to `git` via `tokio::process::Command`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::FileError;

static BRANCH_UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("valid regex"));

async fn git(repo_root: &Path, args: &[&str]) -> Result<String, FileError> {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(repo_root)
        .output()
        .await
        .map_err(|e| FileError::GitError(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FileError::GitError(format!(
            "git {} failed (exit {}): {}",
            args.first().unwrap_or(&""),
            output.status,
            stderr.trim()
        )));
    }

    String::from_utf8(output.stdout)
        .map_err(|e| FileError::GitError(format!("git output is not valid UTF-8: {e}")))
}

/// Tracked plus untracked-but-not-ignored files, root-relative.
pub async fn list_tracked_and_untracked(repo_root: &Path) -> Result<Vec<String>, FileError> {
    let stdout = git(
        repo_root,
        &["ls-files", "--cached", "--others", "--exclude-standard"],
    )
    .await?;
    Ok(stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Find the repository root containing `path`.
pub async fn find_repo_root(path: &Path) -> Result<PathBuf, FileError> {
    let stdout = git(path, &["rev-parse", "--show-toplevel"]).await?;
    Ok(PathBuf::from(stdout.trim()))
}

pub async fn is_git_repo(path: &Path) -> bool {
    git(path, &["rev-parse", "--is-inside-work-tree"])
        .await
        .is_ok_and(|out| out.trim() == "true")
}

/// Whether the working tree has staged, unstaged or untracked changes.
pub async fn has_uncommitted_changes(repo_root: &Path) -> Result<bool, FileError> {
    let stdout = git(repo_root, &["status", "--porcelain"]).await?;
    Ok(!stdout.trim().is_empty())
}

/// Current branch name, `None` when detached or outside a repository.
pub async fn current_branch(repo_root: &Path) -> Option<String> {
    let branch = git(repo_root, &["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .ok()?
        .trim()
        .to_string();
    (!branch.is_empty() && branch != "HEAD").then_some(branch)
}

/// Create and check out a new branch.
pub async fn create_branch(repo_root: &Path, name: &str) -> Result<(), FileError> {
    git(repo_root, &["checkout", "-b", name]).await.map(|_| ())
}

/// Check out `target` and merge `branch` into it.
pub async fn merge_into(repo_root: &Path, target: &str, branch: &str) -> Result<(), FileError> {
    git(repo_root, &["checkout", target]).await?;
    git(repo_root, &["merge", branch]).await.map(|_| ())
}

/// Make a commit name safe for use in a branch name.
///
/// Characters outside `[A-Za-z0-9_-]` become `-`, underscores are stripped
/// from both ends and the result is lowercased.
pub fn sanitize_branch_name(name: &str) -> String {
    BRANCH_UNSAFE
        .replace_all(name, "-")
        .trim_matches('_')
        .to_lowercase()
}

/// Branch name for a run: `<run dir name>_<sanitized commit name>`.
pub fn branch_name(run_name: &str, commit_name: &str) -> String {
    format!("{run_name}_{}", sanitize_branch_name(commit_name))
}
