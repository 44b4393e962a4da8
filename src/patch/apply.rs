//! Writes patch results to the working tree.

use std::path::Path;

use similar::TextDiff;
use tracing::{error, info, warn};

use super::{PatchError, PatchService};
use crate::models::PatchInstruction;
use crate::operator::resolve_within;
use crate::progress::{PatchStatus, ProgressTracker};
use crate::run::{self, RunDir};

/// What happened to one patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Updated,
    Unchanged,
    /// Not applied; the rest of the batch went ahead.
    Skipped(String),
}

/// Restore the original first line when the update blanked it.
pub fn guard_first_line(original: &str, updated: &str) -> String {
    let original_first = original.split('\n').next().unwrap_or_default();
    let mut lines: Vec<&str> = updated.split('\n').collect();
    if lines[0] != original_first && lines[0].trim().is_empty() {
        warn!("first line became empty, preserving original");
        lines[0] = original_first;
    }
    lines.join("\n")
}

/// Unified diff of an applied change, labelled with `path`.
pub fn unified_diff(path: &str, original: &str, updated: &str) -> String {
    TextDiff::from_lines(original, updated)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}

/// Applies patch instructions to files under a root.
pub struct PatchApplier<'a> {
    service: &'a PatchService,
    root: &'a Path,
    run: &'a RunDir,
}

impl<'a> PatchApplier<'a> {
    pub fn new(service: &'a PatchService, root: &'a Path, run: &'a RunDir) -> Self {
        Self { service, root, run }
    }

    /// Apply every patch in order.
    ///
    /// A failing patch is skipped, except for an overloaded provider which
    /// stops the batch.
    pub async fn apply_all(
        &self,
        patches: &mut [PatchInstruction],
        progress: &ProgressTracker,
    ) -> Result<Vec<ApplyOutcome>, PatchError> {
        let mut outcomes = Vec::with_capacity(patches.len());
        for patch in patches.iter_mut() {
            info!(path = %patch.file_path, "processing patch");
            match self.apply_one(patch, progress).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) if e.aborts_batch() => {
                    progress.update(&patch.file_path, PatchStatus::Failed(e.to_string()));
                    return Err(e);
                }
                Err(e) => {
                    error!(path = %patch.file_path, error = %e, "skipping patch");
                    let status = match e {
                        PatchError::TooLarge { .. }
                        | PatchError::MalformedOutput { .. }
                        | PatchError::OutsideRoot(_) => {
                            PatchStatus::Skipped(e.to_string())
                        }
                        _ => PatchStatus::Failed(e.to_string()),
                    };
                    progress.update(&patch.file_path, status);
                    outcomes.push(ApplyOutcome::Skipped(e.to_string()));
                }
            }
        }
        Ok(outcomes)
    }

    /// Apply one patch and record where it landed.
    pub async fn apply_one(
        &self,
        patch: &mut PatchInstruction,
        progress: &ProgressTracker,
    ) -> Result<ApplyOutcome, PatchError> {
        let full_path = resolve_within(self.root, &patch.file_path)
            .map_err(|_| PatchError::OutsideRoot(patch.file_path.clone()))?;
        let original = tokio::fs::read_to_string(&full_path)
            .await
            .map_err(|source| PatchError::Read {
                path: full_path.clone(),
                source,
            })?;

        let tier = self.service.tier_for(&original, &patch.file_path).await?;
        progress.update(&patch.file_path, PatchStatus::Applying(tier.to_string()));
        let updated = self
            .service
            .apply_with_tier(tier, &original, &patch.patch_content, &patch.file_path)
            .await?;
        let updated = guard_first_line(&original, &updated);

        let outcome = if updated == original {
            info!(path = %full_path.display(), "no changes applied");
            progress.update(&patch.file_path, PatchStatus::Unchanged);
            ApplyOutcome::Unchanged
        } else {
            tokio::fs::write(&full_path, &updated)
                .await
                .map_err(|source| PatchError::Write {
                    path: full_path.clone(),
                    source,
                })?;
            self.run.write(
                &format!("patches/{}.applied.diff", run::artifact_name(&patch.file_path)),
                &unified_diff(&patch.file_path, &original, &updated),
            )?;
            info!(path = %full_path.display(), "updated file");
            progress.update(&patch.file_path, PatchStatus::Updated);
            ApplyOutcome::Updated
        };

        patch.processed_path = Some(full_path);
        Ok(outcome)
    }
}
