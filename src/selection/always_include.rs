//! Glob allow-list of files that are always part of the context.

use std::path::Path;

use glob::Pattern;
use tracing::{error, info, warn};

use crate::models::TrackedFile;

/// Parse one pattern per line; blank and `#` lines are skipped.
pub fn parse_patterns(text: &str) -> Vec<Pattern> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match Pattern::new(line) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(pattern = line, error = %e, "ignoring invalid always-include pattern");
                None
            }
        })
        .collect()
}

/// Load patterns from `path`. A missing or unreadable file yields none.
pub fn load_patterns(path: &Path) -> Vec<Pattern> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let patterns = parse_patterns(&text);
            info!(count = patterns.len(), path = %path.display(), "loaded always-include patterns");
            patterns
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "always-include patterns file not found");
            Vec::new()
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "error reading always-include patterns file");
            Vec::new()
        }
    }
}

/// Tracked paths matched by any pattern, sorted and unique.
///
/// `*` also crosses `/`, so `src/*.py` matches nested files.
pub fn matching_files(patterns: &[Pattern], files: &[TrackedFile]) -> Vec<String> {
    let mut matched: Vec<String> = files
        .iter()
        .filter(|file| patterns.iter().any(|p| p.matches(&file.relative)))
        .map(|file| file.relative.clone())
        .collect();
    matched.sort();
    matched.dedup();
    matched
}
