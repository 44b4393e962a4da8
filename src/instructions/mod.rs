//! Instruction parsing and processing for model replies.

pub mod parser;
pub mod processor;

use serde::Serialize;

use crate::models::{InstructionSet, LlmReply};

pub use parser::{ParsedReply, parse, strip_code_block};
pub use processor::{build, build_instruction, process_reply};

/// Serialized form of `processed_instructions.json`.
#[derive(Debug, Serialize)]
pub struct ProcessedInstructions<'a> {
    pub commit_name: Option<&'a str>,
    pub preamble: Option<&'a str>,
    pub postamble: Option<&'a str>,
    #[serde(flatten)]
    pub instructions: &'a InstructionSet,
}

impl<'a> ProcessedInstructions<'a> {
    pub fn new(reply: &'a LlmReply, instructions: &'a InstructionSet) -> Self {
        Self {
            commit_name: reply.commit_name.as_deref(),
            preamble: reply.preamble.as_deref(),
            postamble: reply.postamble.as_deref(),
            instructions,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
