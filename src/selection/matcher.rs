//! Matching model-returned file names against tracked paths.

use crate::config::MatchStrategy;
use crate::models::TrackedFile;

/// Decides whether a name returned by the selection model refers to a
/// tracked path.
pub trait FileMatcher: Send + Sync {
    fn matches(&self, token: &str, relative: &str) -> bool;
}

/// A token matches every path that contains it.
///
/// Tolerates the model dropping directory prefixes, at the cost of
/// over-selecting when a short name occurs inside unrelated paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringMatcher;

impl FileMatcher for SubstringMatcher {
    fn matches(&self, token: &str, relative: &str) -> bool {
        relative.contains(token)
    }
}

/// A token matches paths whose final component equals it, or the full
/// relative path itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasenameMatcher;

impl FileMatcher for BasenameMatcher {
    fn matches(&self, token: &str, relative: &str) -> bool {
        relative == token || relative.rsplit('/').next() == Some(token)
    }
}

pub fn matcher_for(strategy: MatchStrategy) -> Box<dyn FileMatcher> {
    match strategy {
        MatchStrategy::Substring => Box::new(SubstringMatcher),
        MatchStrategy::Basename => Box::new(BasenameMatcher),
    }
}

/// Split a comma-separated reply into trimmed, non-empty names.
pub fn parse_reply(reply: &str) -> Vec<String> {
    reply
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tracked paths matched by any token, sorted and unique.
pub fn match_files(tokens: &[String], files: &[TrackedFile], matcher: &dyn FileMatcher) -> Vec<String> {
    let mut matched: Vec<String> = files
        .iter()
        .filter(|file| tokens.iter().any(|t| matcher.matches(t, &file.relative)))
        .map(|file| file.relative.clone())
        .collect();
    matched.sort();
    matched.dedup();
    matched
}
