//! Progress reporting for terminal output.
//!
//! Live per-file status while a batch of patches is applied, with colored
//! icons for each outcome. Silenced when stderr is not interactive.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

use colored::Colorize;

/// Status of one patch target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchStatus {
    Pending,
    /// Model call in flight on the named tier.
    Applying(String),
    Updated,
    /// Model output equals the original file.
    Unchanged,
    /// Left untouched; the reason is shown.
    Skipped(String),
    Failed(String),
}

/// Tracks and renders live progress for a patch batch.
pub struct ProgressTracker {
    inner: Mutex<ProgressState>,
    /// If false, all output is suppressed.
    enabled: bool,
}

struct ProgressState {
    /// file → status (sorted for stable rendering).
    files: BTreeMap<String, PatchStatus>,
    /// Number of lines we last printed (for clearing).
    rendered_lines: usize,
}

/// Counts per outcome after a batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ProgressTracker {
    pub fn new(files: &[String], enabled: bool) -> Self {
        let files = files
            .iter()
            .map(|f| (f.clone(), PatchStatus::Pending))
            .collect();
        Self {
            inner: Mutex::new(ProgressState {
                files,
                rendered_lines: 0,
            }),
            enabled,
        }
    }

    fn state(&self) -> MutexGuard<'_, ProgressState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Update the status of a file and re-render.
    pub fn update(&self, file: &str, status: PatchStatus) {
        let mut state = self.state();
        state.files.insert(file.to_string(), status);
        if self.enabled {
            Self::render(&mut state);
        }
    }

    pub fn start(&self) {
        if self.enabled {
            Self::render(&mut self.state());
        }
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for status in self.state().files.values() {
            match status {
                PatchStatus::Updated => summary.updated += 1,
                PatchStatus::Unchanged => summary.unchanged += 1,
                PatchStatus::Skipped(_) => summary.skipped += 1,
                PatchStatus::Failed(_) => summary.failed += 1,
                PatchStatus::Pending | PatchStatus::Applying(_) => {}
            }
        }
        summary
    }

    /// Clear progress lines and print the final status of every file.
    pub fn finish(&self) -> BatchSummary {
        let summary = self.summary();
        if !self.enabled {
            return summary;
        }
        let mut state = self.state();
        Self::clear_lines(state.rendered_lines);
        state.rendered_lines = 0;

        let stderr = io::stderr();
        let mut handle = stderr.lock();
        for (file, status) in &state.files {
            let (icon, text) = Self::describe(status);
            let _ = writeln!(handle, "  {icon} {} {text}", file.dimmed());
        }
        let _ = writeln!(
            handle,
            "\n  {} updated, {} unchanged, {} skipped, {} failed",
            summary.updated.to_string().green().bold(),
            summary.unchanged,
            summary.skipped.to_string().yellow(),
            summary.failed.to_string().red(),
        );
        summary
    }

    fn describe(status: &PatchStatus) -> (String, String) {
        match status {
            PatchStatus::Pending => ("○".dimmed().to_string(), "waiting".dimmed().to_string()),
            PatchStatus::Applying(tier) => (
                "◌".cyan().bold().to_string(),
                format!("applying ({tier} tier)…").cyan().to_string(),
            ),
            PatchStatus::Updated => ("✔".green().bold().to_string(), "updated".green().to_string()),
            PatchStatus::Unchanged => ("✔".green().to_string(), "no changes".dimmed().to_string()),
            PatchStatus::Skipped(reason) => {
                ("⚠".yellow().bold().to_string(), reason.yellow().to_string())
            }
            PatchStatus::Failed(reason) => ("✖".red().bold().to_string(), reason.red().to_string()),
        }
    }

    /// Render the current state to stderr, clearing previous output.
    fn render(state: &mut ProgressState) {
        Self::clear_lines(state.rendered_lines);

        let stderr = io::stderr();
        let mut handle = stderr.lock();
        let _ = writeln!(
            handle,
            "  {} Applying {} patch(es)",
            "▸".cyan().bold(),
            state.files.len()
        );
        for (file, status) in &state.files {
            let (icon, text) = Self::describe(status);
            let _ = writeln!(handle, "    {icon} {} {text}", file.dimmed());
        }
        let _ = handle.flush();
        state.rendered_lines = state.files.len() + 1;
    }

    /// Move cursor up and clear `n` lines.
    fn clear_lines(n: usize) {
        if n == 0 {
            return;
        }
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        for _ in 0..n {
            let _ = write!(handle, "\x1b[1A\x1b[2K");
        }
        let _ = handle.flush();
    }
}
