//! Recovers action blocks from free-form model text.
//!
//! A block is `###<ACTION>: <target>` followed by a fenced code block.
//! A `###COMMIT: <name>` line may appear anywhere. Text before the first
//! block is the preamble and text after the last block the postamble.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::ParsedInstructionBlock;

static COMMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"###COMMIT\s*:?\s*(.+)").expect("valid regex"));

static BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)###(\w+):\s*(\S+)\s*```(?:.*?)\n(.*?)```").expect("valid regex")
});

const FENCE: &str = "```";

/// Everything the parser recovers from one reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReply {
    pub blocks: Vec<ParsedInstructionBlock>,
    pub preamble: Option<String>,
    pub postamble: Option<String>,
    pub commit_name: Option<String>,
}

/// Parse a reply. Pure; never drops text it cannot structure.
///
/// Without any block the whole trimmed text becomes the preamble.
pub fn parse(text: &str) -> ParsedReply {
    let commit_name = COMMIT
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|name| !name.is_empty());

    let matches: Vec<_> = BLOCK.captures_iter(text).collect();
    let (Some(first), Some(last)) = (matches.first(), matches.last()) else {
        return ParsedReply {
            blocks: Vec::new(),
            preamble: Some(text.trim().to_string()),
            postamble: None,
            commit_name,
        };
    };

    let start = first.get(0).map_or(0, |m| m.start());
    let end = last.get(0).map_or(text.len(), |m| m.end());

    let blocks = matches
        .iter()
        .map(|c| ParsedInstructionBlock {
            action: c[1].to_lowercase(),
            target: c[2].to_string(),
            content_lines: trim_blank_edges(&c[3]),
        })
        .collect();

    ParsedReply {
        blocks,
        preamble: non_empty(&text[..start]),
        postamble: non_empty(&text[end..]),
        commit_name,
    }
}

/// Remove one redundant pair of bare fence lines around `content`.
pub fn strip_code_block(content: &str) -> String {
    let mut lines: Vec<&str> = content.split('\n').collect();
    if lines.first().is_some_and(|l| l.trim() == FENCE) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim() == FENCE) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

fn trim_blank_edges(content: &str) -> Vec<String> {
    let lines: Vec<&str> = content.split('\n').collect();
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].iter().map(|l| l.to_string()).collect(),
        _ => Vec::new(),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn block(action: &str, target: &str, lines: &[&str]) -> ParsedInstructionBlock {
        ParsedInstructionBlock {
            action: action.to_string(),
            target: target.to_string(),
            content_lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn render(blocks: &[ParsedInstructionBlock]) -> String {
        blocks
            .iter()
            .map(|b| {
                format!(
                    "###{}: {}\n```python\n{}\n```\n",
                    b.action.to_uppercase(),
                    b.target,
                    b.content_lines.join("\n")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn full_reply() {
        let text = "Here is the plan.\n\n###COMMIT: add-login-check\n\n###PATCH: src/app.py\n```python\n\ndef login():\n    return check()\n\n```\n\n###NEW: src/check.py\n```\ndef check():\n    return True\n```\n\n###BASH: setup.sh\n```bash\npip install x\n```\nRun the tests afterwards.\n";
        let reply = parse(text);

        assert_eq!(reply.commit_name.as_deref(), Some("add-login-check"));
        assert_eq!(
            reply.preamble.as_deref(),
            Some("Here is the plan.\n\n###COMMIT: add-login-check")
        );
        assert_eq!(reply.postamble.as_deref(), Some("Run the tests afterwards."));
        assert_eq!(
            reply.blocks,
            vec![
                block("patch", "src/app.py", &["def login():", "    return check()"]),
                block("new", "src/check.py", &["def check():", "    return True"]),
                block("bash", "setup.sh", &["pip install x"]),
            ]
        );
    }

    #[test]
    fn no_blocks_keeps_whole_text_as_preamble() {
        let text = "  I need more information about the database layer.\n###COMMIT: nothing-yet\n";
        let reply = parse(text);
        assert!(reply.blocks.is_empty());
        assert_eq!(reply.preamble.as_deref(), Some(text.trim()));
        assert_eq!(reply.postamble, None);
        assert_eq!(reply.commit_name.as_deref(), Some("nothing-yet"));
    }

    #[test]
    fn empty_text() {
        let reply = parse("");
        assert!(reply.blocks.is_empty());
        assert_eq!(reply.preamble.as_deref(), Some(""));
        assert_eq!(reply.commit_name, None);
    }

    #[test]
    fn commit_colon_is_optional() {
        assert_eq!(parse("###COMMIT fix typo").commit_name.as_deref(), Some("fix typo"));
        assert_eq!(parse("###COMMIT:   ").commit_name, None);
    }

    #[test]
    fn action_is_lowercased_and_unknown_actions_are_kept() {
        let reply = parse("###Delete: old.py\n```\nx\n```");
        assert_eq!(reply.blocks, vec![block("delete", "old.py", &["x"])]);
        assert_eq!(reply.preamble, None);
        assert_eq!(reply.postamble, None);
    }

    #[test]
    fn unterminated_fence_is_not_a_block() {
        let text = "###PATCH: a.py\n```python\nprint(1)\n";
        let reply = parse(text);
        assert!(reply.blocks.is_empty());
        assert_eq!(reply.preamble.as_deref(), Some(text.trim()));
    }

    #[test]
    fn round_trip_of_rendered_blocks() {
        let blocks = vec![
            block("patch", "a.py", &["x = 1", "", "y = 2"]),
            block("new", "pkg/b.py", &["def b():", "    pass"]),
            block("bash", "run.sh", &["echo ok"]),
        ];
        assert_eq!(parse(&render(&blocks)).blocks, blocks);
    }

    #[test]
    fn parsing_is_idempotent() {
        let text = "pre\n###PATCH: a.py\n```\nbody\n```\npost";
        assert_eq!(parse(text), parse(text));
    }

    #[test]
    fn strip_code_block_unwraps_one_layer() {
        assert_eq!(strip_code_block("```\ncode\n```"), "code");
        assert_eq!(strip_code_block("  ```  \na\nb\n```"), "a\nb");
        assert_eq!(strip_code_block("```python\ncode\n```"), "```python\ncode");
        assert_eq!(strip_code_block("plain"), "plain");
    }
}
