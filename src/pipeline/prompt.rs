//! Editor round-trips for prompts and raw instructions.

use std::path::Path;

use colored::Colorize;
use tracing::{error, info};

use crate::interact::Editor;

/// Extra editor sessions allowed when the prompt comes back empty.
pub const MAX_PROMPT_REOPENS: usize = 3;

async fn read_trimmed(path: &Path) -> String {
    tokio::fs::read_to_string(path)
        .await
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Open the prompt file until it has content.
///
/// `None` when it is still empty after the re-opens.
pub async fn acquire_prompt(editor: &dyn Editor, path: &Path) -> Option<String> {
    for attempt in 0..=MAX_PROMPT_REOPENS {
        if attempt > 0 {
            info!(
                attempt,
                max = MAX_PROMPT_REOPENS,
                "prompt file is empty, reopening for user input"
            );
        }
        eprintln!(
            "{}",
            format!(
                "Opening {} for editing. Processing will start when you close the file.",
                path.display()
            )
            .cyan()
        );
        if let Err(e) = editor.edit(path).await {
            error!(error = %e, "error opening prompt in editor");
            return None;
        }
        let content = read_trimmed(path).await;
        if !content.is_empty() {
            return Some(content);
        }
    }
    None
}

/// Let the user edit `raw` saved at `path`; returns the text to use.
pub async fn review(editor: &dyn Editor, path: &Path, raw: &str) -> String {
    info!("opening raw instructions in editor for review and potential editing");
    if let Err(e) = editor.edit(path).await {
        error!(error = %e, "failed to open editor");
    }
    match tokio::fs::read_to_string(path).await {
        Ok(edited) if edited != raw => {
            info!("raw instructions were edited, using edited version");
            edited
        }
        Ok(_) => raw.to_string(),
        Err(e) => {
            error!(path = %path.display(), error = %e, "could not read reviewed instructions");
            raw.to_string()
        }
    }
}
