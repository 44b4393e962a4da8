//! Edit instructions recovered from a model reply.
//!
//! The parser produces [`ParsedInstructionBlock`]s (raw action tag, target
//! and content lines); the processor turns them into the closed
//! [`EditInstruction`] variant set. Unknown action tags are kept as
//! [`EditInstruction::Ignored`] so they stay visible.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Recognised action tags.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ActionType {
    Patch,
    New,
    Bash,
}

/// An action block as found in the reply text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedInstructionBlock {
    /// Lowercased action tag, recognised or not.
    pub action: String,
    /// Target path or script name, taken verbatim.
    pub target: String,
    /// Lines between the fences, edge blank lines stripped.
    pub content_lines: Vec<String>,
}

impl ParsedInstructionBlock {
    /// The recognised action, if any.
    pub fn action_type(&self) -> Option<ActionType> {
        self.action.parse().ok()
    }
}

/// Replace an existing file using a free-form patch description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchInstruction {
    pub file_path: String,
    pub patch_content: String,
    /// Set once the patch has been staged or applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_path: Option<PathBuf>,
}

/// Create a file with the given content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFileInstruction {
    pub file_path: String,
    pub content: String,
}

/// A shell script to save (never executed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BashScriptInstruction {
    pub script_name: String,
    pub script_content: String,
}

/// Typed edit instruction, one variant per action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EditInstruction {
    Patch(PatchInstruction),
    NewFile(NewFileInstruction),
    BashScript(BashScriptInstruction),
    /// A block whose action tag is not recognised.
    Ignored { tag: String, target: String },
}

/// Instructions grouped by kind, in reply order within each group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionSet {
    pub patches: Vec<PatchInstruction>,
    pub new_files: Vec<NewFileInstruction>,
    pub bash_scripts: Vec<BashScriptInstruction>,
    pub ignored: Vec<String>,
}

impl InstructionSet {
    /// Group an ordered instruction list by kind.
    pub fn from_instructions(instructions: &[EditInstruction]) -> Self {
        let mut set = Self::default();
        for instruction in instructions {
            match instruction {
                EditInstruction::Patch(p) => set.patches.push(p.clone()),
                EditInstruction::NewFile(n) => set.new_files.push(n.clone()),
                EditInstruction::BashScript(b) => set.bash_scripts.push(b.clone()),
                EditInstruction::Ignored { tag, target } => {
                    set.ignored.push(format!("{tag}: {target}"))
                }
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty() && self.new_files.is_empty() && self.bash_scripts.is_empty()
    }
}

/// A fully processed model reply.
///
/// When the text contains no recognised block, `preamble` holds the whole
/// (trimmed) text, `postamble` is `None` and `instructions` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmReply {
    pub commit_name: Option<String>,
    pub preamble: Option<String>,
    pub postamble: Option<String>,
    pub instructions: Vec<EditInstruction>,
}

impl LlmReply {
    /// Instructions grouped by kind.
    pub fn grouped(&self) -> InstructionSet {
        InstructionSet::from_instructions(&self.instructions)
    }
}
