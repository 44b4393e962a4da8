//! Persisted conversation state.
//!
//! Stored as `conversation_state.json` in the run directory. The current
//! layout carries an explicit `version`; files without one are the legacy
//! layout (`message_sequence.messages`, content as a string or a list of
//! text parts) and are migrated on load.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ConversationError;
use crate::constants::STATE_VERSION;
use crate::models::{ChatMessage, Role};

/// Conversation history and turn bookkeeping for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub version: u32,
    pub turn_number: u32,
    pub messages: Vec<ChatMessage>,
    /// Run directory this conversation was resumed from.
    pub previous_run: Option<String>,
    /// Where the first-turn context was saved.
    pub context: Option<String>,
    pub smart_context_added: bool,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            turn_number: 1,
            messages: Vec::new(),
            previous_run: None,
            context: None,
            smart_context_added: false,
        }
    }
}

#[derive(Deserialize)]
struct LegacyState {
    #[serde(default = "first_turn")]
    turn_number: u32,
    #[serde(default)]
    message_sequence: LegacySequence,
    previous_run: Option<String>,
    context: Option<String>,
    #[serde(default)]
    smart_context_added: bool,
}

fn first_turn() -> u32 {
    1
}

#[derive(Deserialize, Default)]
struct LegacySequence {
    #[serde(default)]
    messages: Vec<LegacyMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum LegacyRole {
    System,
    User,
    Assistant,
}

#[derive(Deserialize)]
struct LegacyMessage {
    role: LegacyRole,
    content: LegacyContent,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyContent {
    Text(String),
    Parts(Vec<LegacyPart>),
}

#[derive(Deserialize)]
struct LegacyPart {
    #[serde(rename = "type", default = "text_type")]
    kind: String,
    text: String,
}

fn text_type() -> String {
    "text".to_string()
}

impl LegacyContent {
    fn into_text(self) -> String {
        match self {
            LegacyContent::Text(text) => text,
            LegacyContent::Parts(parts) => parts
                .into_iter()
                .filter(|p| p.kind == "text")
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl From<LegacyState> for ConversationState {
    fn from(legacy: LegacyState) -> Self {
        let messages = legacy
            .message_sequence
            .messages
            .into_iter()
            .filter_map(|m| {
                let content = m.content.into_text();
                match m.role {
                    LegacyRole::User => Some(ChatMessage::user(content)),
                    LegacyRole::Assistant => Some(ChatMessage::assistant(content)),
                    LegacyRole::System => {
                        warn!("dropping system message from legacy conversation state");
                        None
                    }
                }
            })
            .collect();
        Self {
            version: STATE_VERSION,
            turn_number: legacy.turn_number.max(1),
            messages,
            previous_run: legacy.previous_run,
            context: legacy.context,
            smart_context_added: legacy.smart_context_added,
        }
    }
}

/// Check that roles alternate user/assistant.
pub fn validate_alternation(messages: &[ChatMessage]) -> Result<(), ConversationError> {
    for (index, pair) in messages.windows(2).enumerate() {
        if pair[0].role == pair[1].role {
            return Err(ConversationError::Alternation {
                index: index + 1,
                role: pair[1].role,
            });
        }
    }
    Ok(())
}

impl ConversationState {
    /// True until the first-turn context has been seeded.
    pub fn needs_context(&self) -> bool {
        self.messages.is_empty()
    }

    /// Parse either layout, migrating legacy state.
    pub fn from_json(raw: &str) -> Result<Self, ConversationError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let state = match value.get("version").and_then(serde_json::Value::as_u64) {
            Some(v) if v == u64::from(STATE_VERSION) => serde_json::from_value::<Self>(value)?,
            Some(v) if v > u64::from(STATE_VERSION) => {
                return Err(ConversationError::UnsupportedVersion(v));
            }
            _ => {
                info!("migrating legacy conversation state");
                Self::from(serde_json::from_value::<LegacyState>(value)?)
            }
        };
        validate_alternation(&state.messages)?;
        Ok(state)
    }

    /// Load from `path`; `None` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConversationError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_json(&raw).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no existing conversation state");
                Ok(None)
            }
            Err(source) => Err(ConversationError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConversationError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConversationError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), turn = self.turn_number, "saved conversation state");
        Ok(())
    }
}
