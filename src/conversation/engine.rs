//! One chat turn against the instruction model.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::{ConversationError, ConversationState, validate_alternation};
use crate::constants;
use crate::context::{self, ProjectTexts};
use crate::models::ChatMessage;
use crate::providers::{LanguageModel, ProviderError};
use crate::run::RunDir;
use crate::selection::SmartContextBuilder;

/// Assistant reply recorded after the context message.
pub const CONTEXT_ACKNOWLEDGEMENT: &str =
    "Thank you for providing this initial context. How can I help?";

pub fn wrap_context(context: &str) -> String {
    format!("<context>{context}</context>")
}

/// Sends prompts with the full history and records the exchange.
pub struct ChatEngine {
    model: Arc<dyn LanguageModel>,
}

impl ChatEngine {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &str {
        self.model.model()
    }

    /// Build the first-turn context for `request` and seed it into `state`.
    ///
    /// Does nothing once the history holds messages.
    pub async fn initialize(
        &self,
        state: &mut ConversationState,
        builder: &SmartContextBuilder,
        root: &Path,
        request: &str,
        run: &RunDir,
    ) -> Result<(), ConversationError> {
        if !state.needs_context() {
            return Ok(());
        }
        info!("initializing conversation context");
        let smart = builder.build(request, run).await?;
        let texts = ProjectTexts::load(root).await?;
        let initial = context::build_initial_context(&smart.text, &texts);
        let saved = run.write(constants::INITIAL_CONTEXT_FILE, &initial)?;
        info!(path = %saved.display(), "saved initial context");
        Self::seed(state, &initial, &saved.display().to_string());
        Ok(())
    }

    /// Prepend the context exchange to an empty history.
    pub fn seed(state: &mut ConversationState, initial_context: &str, saved_at: &str) {
        if !state.needs_context() {
            warn!("conversation already has history, not seeding context");
            return;
        }
        state.messages.push(ChatMessage::user(wrap_context(initial_context)));
        state.messages.push(ChatMessage::assistant(CONTEXT_ACKNOWLEDGEMENT));
        state.context = Some(saved_at.to_string());
        state.smart_context_added = true;
    }

    /// Send `prompt` after the history and return the raw reply.
    ///
    /// The history only grows when the model answered with text.
    pub async fn send(
        &self,
        state: &mut ConversationState,
        prompt: &str,
    ) -> Result<String, ConversationError> {
        validate_alternation(&state.messages)?;
        let mut messages = state.messages.clone();
        messages.push(ChatMessage::user(prompt));
        info!(
            model = self.model.model(),
            messages = messages.len(),
            turn = state.turn_number,
            "sending prompt"
        );

        let reply = self.model.generate(&messages, None).await?;
        if reply.trim().is_empty() {
            return Err(ProviderError::EmptyResponse.into());
        }
        state.messages.push(ChatMessage::user(prompt));
        state.messages.push(ChatMessage::assistant(reply.as_str()));
        Ok(reply)
    }
}
