//! Rewrites oversized prompts with the fast model before they are sent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use colored::Colorize;
use tracing::{error, info, warn};

use crate::constants;
use crate::interact::{Confirm, Editor};
use crate::models::ChatMessage;
use crate::providers::LanguageModel;
use crate::run::RunDir;

/// Instructions sent ahead of an oversized prompt.
pub const POST_PROCESSING_PROMPT: &str = include_str!("../templates/post_processing_prompt.txt");

pub const USE_POST_PROCESSED_QUESTION: &str = "Do you want to use the post-processed prompt?";

/// Shortens prompts longer than a character limit.
pub struct PromptPostProcessor {
    model: Arc<dyn LanguageModel>,
    template: String,
    char_limit: usize,
}

impl PromptPostProcessor {
    pub fn new(model: Arc<dyn LanguageModel>, char_limit: usize) -> Self {
        Self {
            model,
            template: POST_PROCESSING_PROMPT.trim().to_string(),
            char_limit,
        }
    }

    pub fn needs_processing(&self, prompt: &str) -> bool {
        prompt.chars().count() > self.char_limit
    }

    /// Rewrite `prompt` and save it as `post_processed_prompt.md`.
    ///
    /// `None` when the prompt is short enough or the rewrite failed.
    pub async fn post_process(&self, prompt: &str, run: &RunDir) -> Option<PathBuf> {
        if !self.needs_processing(prompt) {
            info!(limit = self.char_limit, "prompt within limit, skipping post-processing");
            return None;
        }
        if self.template.is_empty() {
            warn!("post-processing prompt is empty, skipping post-processing");
            return None;
        }
        info!("post-processing prompt");
        let request = format!("{}\n\n{prompt}", self.template);
        let rewritten = match self.model.generate(&[ChatMessage::user(request)], None).await {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "error during prompt post-processing");
                return None;
            }
        };
        match run.write(constants::POST_PROCESSED_PROMPT_FILE, &rewritten) {
            Ok(path) => {
                info!(path = %path.display(), "post-processed prompt saved");
                Some(path)
            }
            Err(e) => {
                error!(error = %e, "error saving post-processed prompt");
                None
            }
        }
    }

    /// Offer the rewrite for review and return the prompt to send.
    ///
    /// Falls back to `prompt` whenever anything goes wrong.
    pub async fn finalize(
        &self,
        prompt: &str,
        original_path: &Path,
        run: &RunDir,
        turn: u32,
        editor: &dyn Editor,
        confirm: &dyn Confirm,
    ) -> String {
        let Some(processed) = self.post_process(prompt, run).await else {
            return prompt.to_string();
        };
        eprintln!(
            "{}",
            "Prompt has been post-processed. Opening both original and post-processed prompts for review."
                .green()
                .bold()
        );
        if let Err(e) = editor.diff(original_path, &processed).await {
            warn!(error = %e, "could not open diff view");
        }
        if !confirm.confirm(USE_POST_PROCESSED_QUESTION).await {
            info!("user chose to use the original prompt");
            return prompt.to_string();
        }

        let content = match tokio::fs::read_to_string(&processed).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %processed.display(), error = %e, "post-processed prompt unreadable, using original");
                return prompt.to_string();
            }
        };
        if let Err(e) = crate::run::write_creating_parents(&run.post_processed_prompt_path(turn), &content) {
            error!(error = %e, "error saving post-processed prompt for turn");
        } else {
            info!(turn, "saved post-processed prompt for turn");
        }
        content
    }
}
