//! Smart context: choosing the files relevant to one request.
//!
//! The fast model gets the project summary, the declaration index and the
//! request, and answers with file names. Those are matched against the
//! tracked files, unioned with the always-include globs and shown to the
//! user together with their token count before anything is assembled.

pub mod always_include;
pub mod matcher;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use colored::Colorize;
use glob::Pattern;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::ContextConfig;
use crate::constants;
use crate::context::ContextAssembler;
use crate::declarations::{self, DeclarationError, DeclarationExtractor};
use crate::files::{self, FileError};
use crate::interact::Confirm;
use crate::models::{ChatMessage, TrackedFile};
use crate::providers::{LanguageModel, ProviderError, TokenCounter};
use crate::run::{self, RunDir, RunDirError};
use crate::summary::{ProjectSummarizer, SummaryError};

pub use matcher::{FileMatcher, matcher_for};

pub const INCLUDE_ALL_QUESTION: &str = "Do you want to include all files in the context? (Yes/No)";
pub const USE_SELECTION_QUESTION: &str =
    "Do you want to include only these selected files in the context? if no all files will be included";

/// Errors that stop a selection.
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error(transparent)]
    Files(#[from] FileError),

    #[error(transparent)]
    Declarations(#[from] DeclarationError),

    #[error(transparent)]
    Summary(SummaryError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    RunDir(#[from] RunDirError),
}

impl From<SummaryError> for SelectionError {
    fn from(err: SummaryError) -> Self {
        match err {
            SummaryError::Provider(e) => SelectionError::Provider(e),
            other => SelectionError::Summary(other),
        }
    }
}

/// Why a file ended up in the merged selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FileSource {
    #[strum(serialize = "LLM")]
    Llm,
    #[strum(serialize = "Always Include")]
    AlwaysInclude,
    #[strum(serialize = "LLM, Always Include")]
    Both,
}

/// Model-selected and pattern-forced files, plus their sorted union.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelevanceSelection {
    pub llm_selected: Vec<String>,
    pub always_include: Vec<String>,
    pub merged: Vec<String>,
}

impl RelevanceSelection {
    pub fn new(llm_selected: Vec<String>, always_include: Vec<String>) -> Self {
        let merged = merge_file_lists(&llm_selected, &always_include);
        Self {
            llm_selected,
            always_include,
            merged,
        }
    }

    pub fn source(&self, file: &str) -> Option<FileSource> {
        let by_llm = self.llm_selected.iter().any(|f| f == file);
        let forced = self.always_include.iter().any(|f| f == file);
        match (by_llm, forced) {
            (true, true) => Some(FileSource::Both),
            (true, false) => Some(FileSource::Llm),
            (false, true) => Some(FileSource::AlwaysInclude),
            (false, false) => None,
        }
    }

    fn log(&self) {
        info!(
            llm = self.llm_selected.len(),
            always_include = self.always_include.len(),
            merged = self.merged.len(),
            "merged file selection"
        );
        for file in &self.merged {
            if let Some(source) = self.source(file) {
                info!("{file} - Source: {source}");
            }
        }
    }
}

/// Union of both lists, unique and lexicographically sorted.
pub fn merge_file_lists(llm_selected: &[String], always_include: &[String]) -> Vec<String> {
    llm_selected
        .iter()
        .chain(always_include)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Prompt asking the model which files matter for `request`.
pub fn build_selection_prompt(summary: &str, declarations: &str, request: &str) -> String {
    format!(
        "Given the following project summary, file declarations, and a user request, select the most relevant files for the context:\n\n\
         Project Summary:\n{summary}\n\n\
         File Declarations:\n{declarations}\n\n\
         User Request: \"{request}\"\n\n\
         Return ONLY a comma-separated list of file names (not full paths) that are most relevant to the user request. Do not return anything else than the list of files.\n\n\
         Make sure to include any file that is relevant or potentially relevant, or loosly related to the user request. It's better to select more files than less.\n\n\
         IF we need file from a module in src/modules/, includes 100% of all the files in this module.\n"
    )
}

/// Audit record of the selection exchange.
pub fn conversation_log(prompt: &str, response: &str, matched: &[String]) -> String {
    let mut names: Vec<&str> = matched
        .iter()
        .map(|f| f.rsplit('/').next().unwrap_or(f))
        .collect();
    names.sort_unstable();
    format!(
        "LLM Request:\n{prompt}\n\nLLM Response:\n{response}\n\nParsed Relevant Files:\n{}",
        names.join(", ")
    )
}

/// Sum of the counting service's answer for each file.
///
/// Unreadable files are logged and skipped; counting failures propagate.
pub async fn count_tokens(
    counter: &dyn TokenCounter,
    root: &Path,
    files: &[String],
) -> Result<usize, ProviderError> {
    let mut total = 0;
    for relative in files {
        let content = match tokio::fs::read(root.join(relative)).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                error!(path = %relative, error = %e, "skipping file in token count");
                continue;
            }
        };
        total += counter.count(&content).await?;
    }
    Ok(total)
}

/// Files chosen for the context and their assembled text.
#[derive(Debug, Clone, Default)]
pub struct SmartContext {
    pub files: Vec<String>,
    pub text: String,
    pub total_tokens: usize,
}

/// Runs the selection flow for one request.
pub struct SmartContextBuilder {
    root: PathBuf,
    config: ContextConfig,
    model: Arc<dyn LanguageModel>,
    counter: Arc<dyn TokenCounter>,
    confirm: Arc<dyn Confirm>,
    matcher: Box<dyn FileMatcher>,
    patterns: Vec<Pattern>,
}

impl SmartContextBuilder {
    /// `model` answers the selection question and writes the summaries.
    pub fn new(
        root: &Path,
        config: &ContextConfig,
        model: Arc<dyn LanguageModel>,
        counter: Arc<dyn TokenCounter>,
        confirm: Arc<dyn Confirm>,
    ) -> Self {
        let patterns = always_include::load_patterns(&root.join(&config.always_include_file));
        Self {
            root: root.to_path_buf(),
            config: config.clone(),
            model,
            counter,
            confirm,
            matcher: matcher_for(config.matcher),
            patterns,
        }
    }

    /// Swap the strategy used to match returned names.
    pub fn with_matcher(mut self, matcher: Box<dyn FileMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Select, confirm and assemble the context for `request`.
    pub async fn build(&self, request: &str, run: &RunDir) -> Result<SmartContext, SelectionError> {
        info!("building smart context");
        let tracked = files::list_tracked_files(&self.root).await?;

        let mut extractor = DeclarationExtractor::new()?;
        let index = extractor.build_index(&tracked).await;
        let declarations_text = declarations::format_for_llm(&index);
        if let Err(e) = run.write(constants::DECLARATIONS_FILE, &declarations_text) {
            error!(error = %e, "error saving declarations");
        }

        let mut summarizer = ProjectSummarizer::load(
            self.root.join(&self.config.summary_file),
            self.config.summary_char_limit,
            Arc::clone(&self.model),
        )?;
        summarizer.refresh(&tracked).await?;

        let selection = self
            .select(request, &tracked, &summarizer.format_for_llm(), &declarations_text, run)
            .await?;
        selection.log();

        let all: Vec<String> = tracked.iter().map(|f| f.relative.clone()).collect();
        let (files, total_tokens) = self.confirm_selection(&selection, &all).await?;
        info!(total_tokens, "total token count for selected files");
        eprintln!(
            "{}",
            format!("Total token count for selected files: {total_tokens}")
                .cyan()
                .bold()
        );

        let text = if files.is_empty() {
            info!("no relevant files to build context");
            String::new()
        } else {
            ContextAssembler::new(&self.root, &self.config)
                .assemble(&files)
                .await
                .text
        };
        run.write(constants::SMART_CONTEXT_FILE, &text)?;

        Ok(SmartContext {
            files,
            text,
            total_tokens,
        })
    }

    /// Ask the model for relevant files and add the always-include set.
    pub async fn select(
        &self,
        request: &str,
        tracked: &[TrackedFile],
        summary: &str,
        declarations: &str,
        run: &RunDir,
    ) -> Result<RelevanceSelection, SelectionError> {
        let prompt = build_selection_prompt(summary, declarations, request);
        let response = self
            .model
            .generate(&[ChatMessage::user(prompt.as_str())], None)
            .await?;
        info!(%response, "selection model response");

        let tokens = matcher::parse_reply(&response);
        let llm_selected = matcher::match_files(&tokens, tracked, self.matcher.as_ref());
        debug!(?tokens, ?llm_selected, "matched selection reply");
        info!(
            selected = llm_selected.len(),
            total = tracked.len(),
            "model selected files"
        );

        let log_name = format!("llm_conversation_{}.txt", run::compact_timestamp());
        if let Err(e) = run.write(&log_name, &conversation_log(&prompt, &response, &llm_selected)) {
            error!(error = %e, "error saving selection conversation");
        }

        let always = always_include::matching_files(&self.patterns, tracked);
        Ok(RelevanceSelection::new(llm_selected, always))
    }

    /// Show the selection and let the user accept it or fall back to all files.
    ///
    /// Returns the chosen files and their token count.
    pub async fn confirm_selection(
        &self,
        selection: &RelevanceSelection,
        all_files: &[String],
    ) -> Result<(Vec<String>, usize), SelectionError> {
        if selection.llm_selected.is_empty() {
            info!("no files were selected as relevant");
            eprintln!("\nNo files were selected as relevant.");
            eprintln!();
            if !self.confirm.confirm(INCLUDE_ALL_QUESTION).await {
                warn!("an empty selection cannot build a context, using all files");
            }
            let total = count_tokens(self.counter.as_ref(), &self.root, all_files).await?;
            return Ok((all_files.to_vec(), total));
        }

        let selected_tokens =
            count_tokens(self.counter.as_ref(), &self.root, &selection.merged).await?;
        eprintln!("\nThe following files have been selected as relevant:");
        for file in &selection.merged {
            eprintln!("- {file}");
        }
        eprintln!("\nTotal files: {}", all_files.len());
        eprintln!("Selected files: {}", selection.merged.len());
        eprintln!("Total token count for selected files: {selected_tokens}");
        eprintln!();

        if self.confirm.confirm(USE_SELECTION_QUESTION).await {
            info!("using selected files");
            Ok((selection.merged.clone(), selected_tokens))
        } else {
            info!("selection declined, using all files");
            let total = count_tokens(self.counter.as_ref(), &self.root, all_files).await?;
            Ok((all_files.to_vec(), total))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interact::AutoConfirm;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Answers every request with the same reply.
    struct Fixed(&'static str);

    #[async_trait]
    impl LanguageModel for Fixed {
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _system: Option<&str>,
        ) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    /// One token per byte; records how many times it was called.
    #[derive(Default)]
    struct ByteCounter {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl TokenCounter for ByteCounter {
        async fn count(&self, text: &str) -> Result<usize, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            Ok(text.len())
        }
    }

    /// Every call fails as an overloaded provider.
    struct Overloaded;

    #[async_trait]
    impl LanguageModel for Overloaded {
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _system: Option<&str>,
        ) -> Result<String, ProviderError> {
            Err(ProviderError::Overloaded("529 overloaded_error".into()))
        }

        fn model(&self) -> &str {
            "overloaded"
        }
    }

    /// Records every question and approves it.
    #[derive(Default)]
    struct Asked(Mutex<Vec<String>>);

    #[async_trait]
    impl Confirm for Asked {
        async fn confirm(&self, question: &str) -> bool {
            self.0.lock().unwrap().push(question.to_string());
            true
        }
    }

    fn builder(root: &Path, confirm: bool, counter: Arc<ByteCounter>) -> SmartContextBuilder {
        SmartContextBuilder::new(
            root,
            &ContextConfig::default(),
            Arc::new(Fixed("a.py")),
            counter,
            Arc::new(AutoConfirm(confirm)),
        )
    }

    #[test]
    fn merge_is_sorted_unique_union() {
        let merged = merge_file_lists(
            &strings(&["src/b.py", "a.py", "src/b.py"]),
            &strings(&["README.md", "a.py"]),
        );
        assert_eq!(merged, strings(&["README.md", "a.py", "src/b.py"]));
    }

    #[test]
    fn sources_are_attributed() {
        let selection = RelevanceSelection::new(strings(&["a.py", "b.py"]), strings(&["b.py", "c.md"]));
        assert_eq!(selection.merged, strings(&["a.py", "b.py", "c.md"]));
        assert_eq!(selection.source("a.py"), Some(FileSource::Llm));
        assert_eq!(selection.source("b.py"), Some(FileSource::Both));
        assert_eq!(selection.source("c.md"), Some(FileSource::AlwaysInclude));
        assert_eq!(selection.source("d.py"), None);
        assert_eq!(FileSource::Both.to_string(), "LLM, Always Include");
    }

    #[test]
    fn prompt_embeds_inputs() {
        let prompt = build_selection_prompt("SUMMARY", "File: a.py", "fix login");
        assert!(prompt.starts_with("Given the following project summary"));
        assert!(prompt.contains("Project Summary:\nSUMMARY\n\nFile Declarations:\nFile: a.py"));
        assert!(prompt.contains("User Request: \"fix login\""));
        assert!(prompt.contains("comma-separated list of file names"));
    }

    #[test]
    fn conversation_log_lists_sorted_basenames() {
        let log = conversation_log("P", "R", &strings(&["src/z.py", "lib/a.py"]));
        assert_eq!(
            log,
            "LLM Request:\nP\n\nLLM Response:\nR\n\nParsed Relevant Files:\na.py, z.py"
        );
    }

    #[tokio::test]
    async fn token_count_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "12345").unwrap();
        std::fs::write(dir.path().join("b.py"), "123").unwrap();
        let counter = ByteCounter::default();
        let total = count_tokens(&counter, dir.path(), &strings(&["a.py", "gone.py", "b.py"]))
            .await
            .unwrap();
        assert_eq!(total, 8);
        assert_eq!(*counter.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn accepted_selection_is_used() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "1234").unwrap();
        std::fs::write(dir.path().join("b.py"), "12").unwrap();
        let counter = Arc::new(ByteCounter::default());
        let builder = builder(dir.path(), true, Arc::clone(&counter));

        let selection = RelevanceSelection::new(strings(&["a.py"]), vec![]);
        let (files, tokens) = builder
            .confirm_selection(&selection, &strings(&["a.py", "b.py"]))
            .await
            .unwrap();
        assert_eq!(files, strings(&["a.py"]));
        assert_eq!(tokens, 4);
        assert_eq!(*counter.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn declined_selection_falls_back_to_all_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "1234").unwrap();
        std::fs::write(dir.path().join("b.py"), "12").unwrap();
        let builder = builder(dir.path(), false, Arc::new(ByteCounter::default()));

        let selection = RelevanceSelection::new(strings(&["a.py"]), strings(&["a.py"]));
        let (files, tokens) = builder
            .confirm_selection(&selection, &strings(&["a.py", "b.py"]))
            .await
            .unwrap();
        assert_eq!(files, strings(&["a.py", "b.py"]));
        assert_eq!(tokens, 6);
    }

    #[tokio::test]
    async fn empty_selection_uses_all_files_either_way() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "1").unwrap();
        for answer in [true, false] {
            let builder = builder(dir.path(), answer, Arc::new(ByteCounter::default()));
            let selection = RelevanceSelection::new(vec![], strings(&["a.py"]));
            let (files, _) = builder
                .confirm_selection(&selection, &strings(&["a.py"]))
                .await
                .unwrap();
            assert_eq!(files, strings(&["a.py"]));
        }
    }

    #[tokio::test]
    async fn build_writes_selection_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.py"), "def handler():\n    return 1\n").unwrap();
        std::fs::write(root.join("b.py"), "class B:\n    pass\n").unwrap();
        std::fs::write(root.join("always_include_patterns.txt"), "b.py\n").unwrap();
        let run = RunDir::create(&dir.path().join("runs")).unwrap();

        let context = builder(&root, true, Arc::new(ByteCounter::default()))
            .build("change the handler", &run)
            .await
            .unwrap();

        assert_eq!(context.files, strings(&["a.py", "b.py"]));
        assert!(context.text.contains("###FILENAME: a.py\ndef handler():"));
        assert!(run.read(constants::DECLARATIONS_FILE).unwrap().contains("Function: handler"));
        assert_eq!(run.read(constants::SMART_CONTEXT_FILE).unwrap(), context.text);
        let logs: Vec<_> = std::fs::read_dir(run.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("llm_conversation_"))
            .collect();
        assert_eq!(logs.len(), 1);
        assert!(root.join("file_summaries.yaml").exists());
    }

    #[tokio::test]
    async fn overloaded_selection_model_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.py"), "def handler():\n    return 1\n").unwrap();
        let run = RunDir::create(&dir.path().join("runs")).unwrap();
        let asked = Arc::new(Asked::default());
        let builder = SmartContextBuilder::new(
            &root,
            &ContextConfig::default(),
            Arc::new(Overloaded),
            Arc::new(ByteCounter::default()),
            asked.clone(),
        );

        let tracked = files::list_tracked_files(&root).await.unwrap();
        let err = builder
            .select("change the handler", &tracked, "a.py:\nhandler", "File: a.py", &run)
            .await
            .unwrap_err();
        assert!(matches!(err, SelectionError::Provider(ProviderError::Overloaded(_))));

        let err = builder.build("change the handler", &run).await.unwrap_err();
        assert!(matches!(err, SelectionError::Provider(ProviderError::Overloaded(_))));

        let logs = std::fs::read_dir(run.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("llm_conversation_"))
            .count();
        assert_eq!(logs, 0);
        assert!(run.read(constants::SMART_CONTEXT_FILE).is_err());
        assert!(asked.0.lock().unwrap().is_empty());
    }
}
