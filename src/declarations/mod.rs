//! Declaration extraction: a flat list of top-level functions, classes and
//! their direct methods per file, used as a relevance signal for selection.
//!
//! Only Python sources are parsed (with tree-sitter); every other file
//! contributes just its `File` sentinel.

use std::path::Path;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, error, info};
use tree_sitter::{Node, Parser};

use crate::models::{Declaration, DeclarationKind, TrackedFile};

/// Errors while extracting declarations from one file.
#[derive(Error, Debug)]
pub enum DeclarationError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to load the Python grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("syntax errors in {0}")]
    Parse(String),
}

/// Declarations per root-relative path, in enumeration order.
pub type DeclarationIndex = IndexMap<String, Vec<Declaration>>;

/// Parses Python sources into declaration lists.
pub struct DeclarationExtractor {
    parser: Parser,
}

impl DeclarationExtractor {
    pub fn new() -> Result<Self, DeclarationError> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into())?;
        Ok(Self { parser })
    }

    /// Declarations of a single file, starting with the `File` sentinel.
    ///
    /// Malformed Python yields [`DeclarationError::Parse`]; callers fall
    /// back to the sentinel alone.
    pub fn extract_source(
        &mut self,
        relative: &str,
        source: &str,
    ) -> Result<Vec<Declaration>, DeclarationError> {
        let mut declarations = vec![Declaration::file(relative)];
        if !is_python(relative) {
            return Ok(declarations);
        }

        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| DeclarationError::Parse(relative.to_string()))?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(DeclarationError::Parse(relative.to_string()));
        }

        let bytes = source.as_bytes();
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            let node = unwrap_decorated(node);
            match node.kind() {
                "function_definition" => {
                    let kind = if is_async(node) {
                        DeclarationKind::AsyncFunction
                    } else {
                        DeclarationKind::Function
                    };
                    if let Some(name) = name_of(node, bytes) {
                        declarations.push(Declaration::new(kind, name));
                    }
                }
                "class_definition" => {
                    if let Some(name) = name_of(node, bytes) {
                        declarations.push(Declaration::new(DeclarationKind::Class, name));
                    }
                    collect_methods(node, bytes, &mut declarations);
                }
                _ => {}
            }
        }
        Ok(declarations)
    }

    /// Read and extract one tracked file.
    pub async fn extract_file(
        &mut self,
        file: &TrackedFile,
    ) -> Result<Vec<Declaration>, DeclarationError> {
        let bytes = tokio::fs::read(&file.absolute)
            .await
            .map_err(|source| DeclarationError::Io {
                path: file.relative.clone(),
                source,
            })?;
        let source = String::from_utf8_lossy(&bytes);
        self.extract_source(&file.relative, &source)
    }

    /// Build the declaration index for a file set.
    ///
    /// Unreadable files are skipped; files that fail to parse keep their
    /// sentinel so they remain selectable.
    pub async fn build_index(&mut self, files: &[TrackedFile]) -> DeclarationIndex {
        let mut index = DeclarationIndex::new();
        for file in files {
            match self.extract_file(file).await {
                Ok(declarations) => {
                    debug!(path = %file.relative, count = declarations.len(), "extracted declarations");
                    index.insert(file.relative.clone(), declarations);
                }
                Err(e @ DeclarationError::Io { .. }) => {
                    error!(error = %e, "skipping file");
                }
                Err(e) => {
                    error!(error = %e, "error extracting declarations");
                    index.insert(file.relative.clone(), vec![Declaration::file(&file.relative)]);
                }
            }
        }
        info!(files = index.len(), "built declaration index");
        index
    }
}

fn is_python(relative: &str) -> bool {
    Path::new(relative)
        .extension()
        .is_some_and(|ext| ext == "py")
}

fn unwrap_decorated(node: Node<'_>) -> Node<'_> {
    if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition").unwrap_or(node)
    } else {
        node
    }
}

fn is_async(function: Node<'_>) -> bool {
    function.child(0).is_some_and(|first| first.kind() == "async")
}

fn name_of<'a>(node: Node<'_>, source: &'a [u8]) -> Option<&'a str> {
    node.child_by_field_name("name")?.utf8_text(source).ok()
}

/// Record direct methods of a class; nested classes are not descended.
fn collect_methods(class: Node<'_>, source: &[u8], out: &mut Vec<Declaration>) {
    let Some(body) = class.child_by_field_name("body") else {
        return;
    };
    let mut cursor = body.walk();
    for item in body.named_children(&mut cursor) {
        let item = unwrap_decorated(item);
        if item.kind() == "function_definition" {
            if let Some(name) = name_of(item, source) {
                out.push(Declaration::new(DeclarationKind::Method, name));
            }
        }
    }
}

/// Render the index for the selection prompt.
///
/// Each file is a `File: <path>` line followed by `<Kind>: <name>` lines;
/// files are separated by a blank line.
pub fn format_for_llm(index: &DeclarationIndex) -> String {
    index
        .iter()
        .map(|(path, declarations)| {
            let mut lines = vec![format!("File: {path}")];
            lines.extend(
                declarations
                    .iter()
                    .filter(|d| d.kind != DeclarationKind::File)
                    .map(|d| format!("{}: {}", d.kind, d.name)),
            );
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds_and_names(declarations: &[Declaration]) -> Vec<(DeclarationKind, &str)> {
        declarations
            .iter()
            .map(|d| (d.kind, d.name.as_str()))
            .collect()
    }

    #[test]
    fn extracts_top_level_python_declarations() {
        let source = r#"
import os

def helper():
    def inner():
        pass
    return 1

async def fetch(url):
    return url

@dataclass
class User:
    name: str

    def greet(self):
        return "hi"

    @property
    def upper(self):
        return self.name.upper()

    class Meta:
        def hidden(self):
            pass
"#;
        let mut extractor = DeclarationExtractor::new().unwrap();
        let declarations = extractor.extract_source("app/models.py", source).unwrap();
        assert_eq!(
            kinds_and_names(&declarations),
            vec![
                (DeclarationKind::File, "app/models.py"),
                (DeclarationKind::Function, "helper"),
                (DeclarationKind::AsyncFunction, "fetch"),
                (DeclarationKind::Class, "User"),
                (DeclarationKind::Method, "greet"),
                (DeclarationKind::Method, "upper"),
            ]
        );
    }

    #[test]
    fn non_python_files_yield_sentinel_only() {
        let mut extractor = DeclarationExtractor::new().unwrap();
        let declarations = extractor
            .extract_source("web/app.js", "function main() {}")
            .unwrap();
        assert_eq!(declarations, vec![Declaration::file("web/app.js")]);
    }

    #[test]
    fn malformed_python_is_a_parse_error() {
        let mut extractor = DeclarationExtractor::new().unwrap();
        let err = extractor
            .extract_source("broken.py", "def broken(:\n    pass\n")
            .unwrap_err();
        assert!(matches!(err, DeclarationError::Parse(ref p) if p == "broken.py"));
    }

    #[tokio::test]
    async fn index_keeps_sentinel_for_broken_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.py"), "def run():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("broken.py"), "class (:\n").unwrap();
        let file = |rel: &str| TrackedFile {
            relative: rel.to_string(),
            absolute: dir.path().join(rel),
            is_text: true,
        };
        let files = vec![file("ok.py"), file("broken.py"), file("gone.py")];

        let mut extractor = DeclarationExtractor::new().unwrap();
        let index = extractor.build_index(&files).await;
        assert_eq!(
            index.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["ok.py", "broken.py"]
        );
        assert_eq!(index["broken.py"], vec![Declaration::file("broken.py")]);
        assert_eq!(index["ok.py"].len(), 2);
    }

    #[test]
    fn format_lists_declarations_per_file() {
        let mut index = DeclarationIndex::new();
        index.insert(
            "a.py".to_string(),
            vec![
                Declaration::file("a.py"),
                Declaration::new(DeclarationKind::Class, "A"),
                Declaration::new(DeclarationKind::Method, "run"),
            ],
        );
        index.insert("README.md".to_string(), vec![Declaration::file("README.md")]);

        assert_eq!(
            format_for_llm(&index),
            "File: a.py\nClass: A\nMethod: run\n\nFile: README.md"
        );
    }
}
