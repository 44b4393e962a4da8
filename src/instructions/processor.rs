//! Turns parsed blocks into typed edit instructions.

use tracing::{info, warn};

use super::parser::{self, strip_code_block};
use crate::models::{
    ActionType, BashScriptInstruction, EditInstruction, LlmReply, NewFileInstruction,
    ParsedInstructionBlock, PatchInstruction,
};

/// Build the typed instruction for one block.
///
/// Unknown action tags become [`EditInstruction::Ignored`].
pub fn build_instruction(block: &ParsedInstructionBlock) -> EditInstruction {
    let content = strip_code_block(block.content_lines.join("\n").trim());
    let target = block.target.clone();
    match block.action_type() {
        Some(ActionType::Patch) => EditInstruction::Patch(PatchInstruction {
            file_path: target,
            patch_content: content,
            processed_path: None,
        }),
        Some(ActionType::New) => EditInstruction::NewFile(NewFileInstruction {
            file_path: target,
            content,
        }),
        Some(ActionType::Bash) => EditInstruction::BashScript(BashScriptInstruction {
            script_name: target,
            script_content: content,
        }),
        None => {
            warn!(tag = %block.action, %target, "ignoring block with unknown action");
            EditInstruction::Ignored {
                tag: block.action.clone(),
                target,
            }
        }
    }
}

pub fn build(blocks: &[ParsedInstructionBlock]) -> Vec<EditInstruction> {
    blocks.iter().map(build_instruction).collect()
}

/// Parse and process raw reply text in one step.
pub fn process_reply(raw: &str) -> LlmReply {
    let parsed = parser::parse(raw);
    let instructions = build(&parsed.blocks);
    let reply = LlmReply {
        commit_name: parsed.commit_name,
        preamble: parsed.preamble,
        postamble: parsed.postamble,
        instructions,
    };
    let grouped = reply.grouped();
    info!(
        patches = grouped.patches.len(),
        new_files = grouped.new_files.len(),
        bash_scripts = grouped.bash_scripts.len(),
        ignored = grouped.ignored.len(),
        "processed instructions"
    );
    reply
}
