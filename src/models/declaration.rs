//! Declaration tags used as a cheap relevance signal.

use serde::{Deserialize, Serialize};

/// Kind of a top-level syntax element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum DeclarationKind {
    /// Sentinel carrying the file's relative path; always first.
    File,
    Function,
    AsyncFunction,
    Class,
    /// Direct method of a top-level class (one level deep only).
    Method,
}

/// A `(kind, name)` pair extracted from a source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub name: String,
}

impl Declaration {
    pub fn new(kind: DeclarationKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// The `(File, path)` sentinel every declaration list starts with.
    pub fn file(relative_path: impl Into<String>) -> Self {
        Self::new(DeclarationKind::File, relative_path)
    }
}
