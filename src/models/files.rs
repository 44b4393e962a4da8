//! Files discovered by the enumerator.

use std::path::PathBuf;

use serde::Serialize;

/// A version-control-visible file under the project root.
///
/// Recomputed on every run and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TrackedFile {
    /// Root-relative path with forward slashes.
    pub relative: String,
    /// Absolute path on disk.
    pub absolute: PathBuf,
    /// Whether the file was classified as text.
    pub is_text: bool,
}

impl TrackedFile {
    /// Final path component of the relative path.
    pub fn file_name(&self) -> &str {
        self.relative
            .rsplit('/')
            .next()
            .unwrap_or(self.relative.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_last_segment() {
        let file = TrackedFile {
            relative: "src/modules/auth/login.py".to_string(),
            absolute: PathBuf::from("/repo/src/modules/auth/login.py"),
            is_text: true,
        };
        assert_eq!(file.file_name(), "login.py");
    }

    #[test]
    fn file_name_of_root_file() {
        let file = TrackedFile {
            relative: "setup.py".to_string(),
            absolute: PathBuf::from("/repo/setup.py"),
            is_text: true,
        };
        assert_eq!(file.file_name(), "setup.py");
    }
}
