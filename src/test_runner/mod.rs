//! Project test execution between turns.
//!
//! Only pytest projects are supported: the suite runs when `pytest.ini`
//! exists at the project root, inside `.venv` when one is present.

use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::run::{RunDir, RunDirError};

pub const SKIPPED: &str = "Tests skipped: pytest.ini not found.";
pub const FAILED_RESULTS_HEADING: &str = "## Failed Test Results";
/// Start of the output when pytest could not be launched.
pub const RUNNER_ERROR_PREFIX: &str = "Error running pytest:";

/// Runs the project's tests and returns their combined output.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, root: &Path) -> String;
}

/// `pytest --disable-warnings` through `/bin/bash`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PytestRunner;

impl PytestRunner {
    fn command(root: &Path) -> String {
        let activate = root.join(".venv").join("bin").join("activate");
        if activate.exists() {
            format!("source {} && pytest --disable-warnings", activate.display())
        } else {
            warn!(path = %activate.display(), "virtual environment not found");
            "pytest --disable-warnings".to_string()
        }
    }
}

#[async_trait]
impl TestRunner for PytestRunner {
    async fn run(&self, root: &Path) -> String {
        if !root.join("pytest.ini").exists() {
            warn!("pytest.ini not found, skipping tests");
            return SKIPPED.to_string();
        }
        info!(dir = %root.display(), "running pytest");
        let output = tokio::process::Command::new("/bin/bash")
            .arg("-c")
            .arg(Self::command(root))
            .current_dir(root)
            .output()
            .await;
        match output {
            Ok(out) => {
                info!(status = %out.status, "pytest finished");
                format!(
                    "{}{}",
                    String::from_utf8_lossy(&out.stdout),
                    String::from_utf8_lossy(&out.stderr)
                )
            }
            Err(e) => format!("{RUNNER_ERROR_PREFIX} {e}"),
        }
    }
}

/// Whether the output counts as a passing run.
///
/// A skipped run passes. Any mention of failures or errors fails.
pub fn check_test_results(output: &str) -> bool {
    if output.starts_with("Tests skipped:") {
        return true;
    }
    if output.contains("errors during collection") {
        return false;
    }
    let lower = output.to_lowercase();
    if lower.contains("failed") || lower.contains("error") {
        return false;
    }
    lower.contains("passed")
}

/// False when pytest collected nothing.
pub fn tests_ran(output: &str) -> bool {
    !output.contains("collected 0 items") && !output.contains("no tests ran")
}

/// Name of the first failing test or module with a collection error.
pub fn first_failed_test(output: &str) -> Option<String> {
    if let Some(line) = output.lines().find(|l| l.contains("ERROR collecting")) {
        return line
            .rsplit("ERROR collecting")
            .next()
            .map(|s| s.trim().to_string());
    }
    output
        .lines()
        .find(|l| l.starts_with("FAILED "))
        .and_then(|l| l.split("::").nth(1))
        .and_then(|s| s.split_whitespace().next())
        .map(str::to_string)
}

/// Record failing output in the next turn's prompt.
///
/// Returns whether anything was appended.
pub fn append_failed_results(
    run: &RunDir,
    project_root: &Path,
    output: &str,
    next_turn: u32,
) -> Result<bool, RunDirError> {
    if !tests_ran(output) || check_test_results(output) {
        return Ok(false);
    }
    if let Some(name) = first_failed_test(output) {
        info!(test = %name, "first failing test");
    }
    let path = run.ensure_prompt(next_turn, project_root)?;
    run.append(&path, &format!("\n\n{FAILED_RESULTS_HEADING}\n\n {output}"))?;
    info!(path = %path.display(), "appended failed test results to next prompt");
    Ok(true)
}
