//! Project summary cache.
//!
//! One short model-written synopsis per tracked file, kept in a YAML
//! mapping keyed by relative path. Only files missing from the cache are
//! summarized; entries for files that disappeared are pruned.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::models::{ChatMessage, TrackedFile};
use crate::providers::{LanguageModel, ProviderError};

/// Errors from the summary cache.
#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("failed to read summary cache {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse summary cache {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml_ng::Error,
    },

    #[error("failed to write summary cache {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize summaries: {0}")]
    Serialize(#[from] serde_yaml_ng::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Outcome of a cache refresh.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshStats {
    pub added: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Loads, refreshes and renders per-file summaries.
pub struct ProjectSummarizer {
    path: PathBuf,
    char_limit: usize,
    model: Arc<dyn LanguageModel>,
    summaries: IndexMap<String, String>,
}

impl ProjectSummarizer {
    /// Open the cache at `path`; a missing file starts empty.
    pub fn load(
        path: PathBuf,
        char_limit: usize,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, SummaryError> {
        let summaries = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| SummaryError::Read {
                path: path.clone(),
                source,
            })?;
            // An empty document deserializes to `None`.
            serde_yaml_ng::from_str::<Option<IndexMap<String, String>>>(&raw)
                .map_err(|source| SummaryError::Parse {
                    path: path.clone(),
                    source,
                })?
                .unwrap_or_default()
        } else {
            info!(path = %path.display(), "no summary cache yet, starting empty");
            IndexMap::new()
        };
        Ok(Self {
            path,
            char_limit,
            model,
            summaries,
        })
    }

    pub fn summaries(&self) -> &IndexMap<String, String> {
        &self.summaries
    }

    /// Bring the cache in line with the tracked file set and persist it if
    /// anything changed.
    ///
    /// A failed summary is logged and left out; an overloaded provider
    /// aborts the refresh.
    pub async fn refresh(&mut self, files: &[TrackedFile]) -> Result<RefreshStats, SummaryError> {
        let mut stats = RefreshStats::default();

        let before = self.summaries.len();
        self.summaries
            .retain(|path, _| files.iter().any(|f| &f.relative == path));
        stats.removed = before - self.summaries.len();

        for file in files {
            if self.summaries.contains_key(&file.relative) {
                continue;
            }
            match self.summarize(file).await {
                Ok(summary) => {
                    debug!(path = %file.relative, "generated summary");
                    self.summaries.insert(file.relative.clone(), summary);
                    stats.added += 1;
                }
                Err(SummaryError::Provider(e @ ProviderError::Overloaded(_))) => {
                    return Err(e.into());
                }
                Err(e) => {
                    error!(path = %file.relative, error = %e, "error generating summary");
                    stats.failed += 1;
                }
            }
        }

        if stats.added > 0 || stats.removed > 0 {
            self.save()?;
        }
        info!(
            added = stats.added,
            removed = stats.removed,
            failed = stats.failed,
            "refreshed project summaries"
        );
        Ok(stats)
    }

    async fn summarize(&self, file: &TrackedFile) -> Result<String, SummaryError> {
        let raw = tokio::fs::read(&file.absolute)
            .await
            .map_err(|source| SummaryError::Read {
                path: file.absolute.clone(),
                source,
            })?;
        let text = String::from_utf8_lossy(&raw);
        let content: String = text.chars().take(self.char_limit).collect();
        let prompt = summary_prompt(&file.relative, &content);
        let reply = self.model.generate(&[ChatMessage::user(prompt)], None).await?;
        Ok(reply.trim().to_string())
    }

    fn save(&self) -> Result<(), SummaryError> {
        let yaml = serde_yaml_ng::to_string(&self.summaries)?;
        write_file(&self.path, &yaml)
    }

    /// `path:\nsummary` blocks separated by blank lines.
    pub fn format_for_llm(&self) -> String {
        let mut out = String::new();
        for (path, summary) in &self.summaries {
            let summary = summary.trim();
            if !summary.is_empty() {
                out.push_str(&format!("{path}:\n{summary}\n\n"));
            }
        }
        out.trim().to_string()
    }
}

fn summary_prompt(path: &str, content: &str) -> String {
    format!(
        "Summarize what this file does in 5 lines or less, list internal dependencies: {path}\n\nContent:\n{content}"
    )
}

fn write_file(path: &Path, content: &str) -> Result<(), SummaryError> {
    std::fs::write(path, content).map_err(|source| SummaryError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Replies with a canned summary and records prompts.
    struct Scripted {
        prompts: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl Scripted {
        fn new(fail_on: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                fail_on,
            })
        }
    }

    #[async_trait]
    impl LanguageModel for Scripted {
        async fn generate(
            &self,
            messages: &[ChatMessage],
            _system: Option<&str>,
        ) -> Result<String, ProviderError> {
            let prompt = messages[0].content.clone();
            self.prompts.lock().unwrap().push(prompt.clone());
            match self.fail_on {
                Some("overloaded") => Err(ProviderError::Overloaded("529".into())),
                Some(name) if prompt.contains(name) => Err(ProviderError::ApiError("boom".into())),
                _ => Ok("  Does things.\nDepends on nothing.  ".to_string()),
            }
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn tracked(root: &Path, rel: &str, content: &str) -> TrackedFile {
        let absolute = root.join(rel);
        std::fs::write(&absolute, content).unwrap();
        TrackedFile {
            relative: rel.to_string(),
            absolute,
            is_text: true,
        }
    }

    #[tokio::test]
    async fn refresh_adds_missing_and_prunes_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("file_summaries.yaml");
        std::fs::write(&cache, "gone.py: old summary\nkeep.py: kept summary\n").unwrap();
        let files = vec![
            tracked(dir.path(), "keep.py", "x = 1"),
            tracked(dir.path(), "new.py", "y = 2"),
        ];

        let model = Scripted::new(None);
        let mut summarizer = ProjectSummarizer::load(cache.clone(), 20_000, model.clone()).unwrap();
        let stats = summarizer.refresh(&files).await.unwrap();

        assert_eq!(
            stats,
            RefreshStats {
                added: 1,
                removed: 1,
                failed: 0
            }
        );
        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with(
            "Summarize what this file does in 5 lines or less, list internal dependencies: new.py"
        ));
        assert!(prompts[0].ends_with("Content:\ny = 2"));

        let reloaded = ProjectSummarizer::load(cache, 20_000, model.clone()).unwrap();
        assert_eq!(
            reloaded.summaries().keys().collect::<Vec<_>>(),
            vec!["keep.py", "new.py"]
        );
        assert_eq!(reloaded.summaries()["new.py"], "Does things.\nDepends on nothing.");
    }

    #[tokio::test]
    async fn content_is_truncated_to_char_limit() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![tracked(dir.path(), "big.py", "abcdefghij")];
        let model = Scripted::new(None);
        let mut summarizer =
            ProjectSummarizer::load(dir.path().join("s.yaml"), 4, model.clone()).unwrap();
        summarizer.refresh(&files).await.unwrap();
        assert!(model.prompts.lock().unwrap()[0].ends_with("Content:\nabcd"));
    }

    #[tokio::test]
    async fn failures_are_skipped_but_overload_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            tracked(dir.path(), "bad.py", "x"),
            tracked(dir.path(), "good.py", "y"),
        ];
        let mut summarizer = ProjectSummarizer::load(
            dir.path().join("s.yaml"),
            100,
            Scripted::new(Some("bad.py")),
        )
        .unwrap();
        let stats = summarizer.refresh(&files).await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.added, 1);

        let mut overloaded = ProjectSummarizer::load(
            dir.path().join("other.yaml"),
            100,
            Scripted::new(Some("overloaded")),
        )
        .unwrap();
        let err = overloaded.refresh(&files).await.unwrap_err();
        assert!(matches!(err, SummaryError::Provider(ProviderError::Overloaded(_))));
    }

    #[tokio::test]
    async fn unchanged_cache_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("s.yaml");
        std::fs::write(&cache, "# hand edited\na.py: summary\n").unwrap();
        let files = vec![tracked(dir.path(), "a.py", "x")];
        let mut summarizer = ProjectSummarizer::load(cache.clone(), 100, Scripted::new(None)).unwrap();
        summarizer.refresh(&files).await.unwrap();
        assert!(std::fs::read_to_string(&cache).unwrap().starts_with("# hand edited"));
    }

    #[test]
    fn format_skips_blank_summaries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("s.yaml");
        std::fs::write(&cache, "a.py: \" first \"\nb.py: ''\nc.py: third\n").unwrap();
        let summarizer = ProjectSummarizer::load(cache, 100, Scripted::new(None)).unwrap();
        assert_eq!(summarizer.format_for_llm(), "a.py:\nfirst\n\nc.py:\nthird");
    }

    #[test]
    fn empty_cache_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("s.yaml");
        std::fs::write(&cache, "").unwrap();
        let summarizer = ProjectSummarizer::load(cache, 100, Scripted::new(None)).unwrap();
        assert!(summarizer.summaries().is_empty());
        assert_eq!(summarizer.format_for_llm(), "");
    }
}
