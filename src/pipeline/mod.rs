//! The interactive turn loop.
//!
//! Each turn moves through [`TurnState`]: the user writes a prompt, long
//! prompts are shortened, the instruction model answers, the user reviews
//! the raw answer, edits are applied, tests run and the user decides
//! whether to continue. Every artifact lands in the run directory.

pub mod autofix;
pub mod prompt;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::constants;
use crate::conversation::{ChatEngine, ConversationError, ConversationState};
use crate::files::{FileError, git};
use crate::instructions::{self, ProcessedInstructions};
use crate::interact::{Confirm, Editor};
use crate::models::{InstructionSet, LlmReply};
use crate::operator::FileOperator;
use crate::patch::{PatchApplier, PatchError, PatchService};
use crate::postprocess::PromptPostProcessor;
use crate::progress::ProgressTracker;
use crate::providers::{self, LanguageModel, MAX_RETRIES, TokenCounter};
use crate::run::{RunDir, RunDirError};
use crate::selection::SmartContextBuilder;
use crate::test_runner::{self, TestRunner};

pub const UNCOMMITTED_QUESTION: &str =
    "There are uncommitted changes in the current branch. Do you want to continue?";
pub const CONTINUE_QUESTION: &str = "Do you want to continue the conversation?";
pub const MAIN_BRANCH: &str = "main";

pub fn merge_question(branch: &str) -> String {
    format!("Current branch is '{branch}'. Do you want to merge it into '{MAIN_BRANCH}'?")
}

/// Errors that end a run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    RunDir(#[from] RunDirError),

    #[error(transparent)]
    Files(#[from] FileError),

    #[error("failed to serialize processed instructions: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Where a turn currently is.
#[derive(Debug, Clone, PartialEq, Eq, strum::IntoStaticStr)]
pub enum TurnState {
    AwaitingPrompt,
    PostProcessing { prompt: String, prompt_path: PathBuf },
    GeneratingInstructions { prompt: String },
    AwaitingReview { raw: String, path: PathBuf },
    ApplyingEdits { raw: String },
    RunningTests,
    AwaitingContinue,
    Done,
}

/// The pluggable pieces a pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Instruction generation.
    pub main: Arc<dyn LanguageModel>,
    /// Selection, summaries, post-processing and small patches.
    pub fast: Arc<dyn LanguageModel>,
    pub large: Arc<dyn LanguageModel>,
    pub counter: Arc<dyn TokenCounter>,
    pub confirm: Arc<dyn Confirm>,
    pub editor: Arc<dyn Editor>,
    pub tests: Arc<dyn TestRunner>,
}

/// Per-invocation inputs.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub root: PathBuf,
    /// Used as the first prompt instead of opening the editor.
    pub prompt_file: Option<PathBuf>,
    /// A saved `raw_instructions_turn_{n}.md` to pick up from.
    pub resume: Option<PathBuf>,
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub turns: u32,
    /// True when the run stopped before any instructions were applied.
    pub cancelled: bool,
    /// Branch merged into main at startup; the run ends after a merge.
    pub merged_branch: Option<String>,
}

impl RunSummary {
    fn stopped(merged_branch: Option<String>) -> Self {
        Self {
            run_dir: PathBuf::new(),
            turns: 0,
            cancelled: true,
            merged_branch,
        }
    }
}

/// Mutable state of one run.
struct Session {
    run: RunDir,
    conversation: ConversationState,
    in_git: bool,
    applied_turns: u32,
}

impl Session {
    fn state_path(&self) -> PathBuf {
        self.run.file(constants::STATE_FILE)
    }

    fn save(&self) -> Result<(), ConversationError> {
        self.conversation.save(&self.state_path())
    }
}

/// Drives turns until the user stops.
pub struct Pipeline {
    config: Config,
    options: PipelineOptions,
    collab: Collaborators,
    engine: ChatEngine,
    post_processor: PromptPostProcessor,
}

impl Pipeline {
    pub fn new(config: &Config, options: PipelineOptions, collab: Collaborators) -> Self {
        let engine = ChatEngine::new(Arc::clone(&collab.main));
        let post_processor = PromptPostProcessor::new(
            Arc::clone(&collab.fast),
            config.pipeline.post_process_char_limit,
        );
        Self {
            config: config.clone(),
            options,
            collab,
            engine,
            post_processor,
        }
    }

    fn root(&self) -> &Path {
        &self.options.root
    }

    /// Run the turn loop.
    ///
    /// A failing turn is logged and printed, the conversation state saved,
    /// and the error returned.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let in_git = git::is_git_repo(self.root()).await;
        if !in_git {
            warn!(root = %self.root().display(), "not a git repository, branch handling disabled");
        } else if git::has_uncommitted_changes(self.root()).await? {
            if !self.collab.confirm.confirm(UNCOMMITTED_QUESTION).await {
                warn!("pipeline execution cancelled by user due to uncommitted changes");
                return Ok(RunSummary::stopped(None));
            }
        } else if let Some(branch) = self.merge_to_main().await {
            return Ok(RunSummary::stopped(Some(branch)));
        }

        let (mut session, mut state) = self.open_session(in_git).await?;
        info!(run = %session.run.path().display(), "starting pipeline");

        while state != TurnState::Done {
            let name: &'static str = (&state).into();
            info!(state = name, turn = session.conversation.turn_number, "turn step");
            state = match self.step(&mut session, state).await {
                Ok(next) => next,
                Err(e) => {
                    error!(error = %e, "an error occurred during pipeline execution");
                    eprintln!("{}", format!("Error: {e}").red().bold());
                    if let Err(save_err) = session.save() {
                        error!(error = %save_err, "could not save conversation state");
                    }
                    return Err(e);
                }
            };
        }

        if self.config.pipeline.run_tests && session.applied_turns > 0 {
            eprintln!("{}", "Running final unit tests...".cyan().bold());
            eprintln!("{}", self.collab.tests.run(self.root()).await);
        }
        eprintln!("{}", "Pipeline execution completed.".green().bold());
        info!(run = %session.run.path().display(), "pipeline execution completed");

        Ok(RunSummary {
            run_dir: session.run.path().to_path_buf(),
            turns: session.applied_turns,
            cancelled: session.applied_turns == 0,
            merged_branch: None,
        })
    }

    async fn open_session(&self, in_git: bool) -> Result<(Session, TurnState), PipelineError> {
        if let Some(resume) = &self.options.resume {
            let dir = resume
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let run = RunDir::open(dir)?;
            let raw = crate::run::read_to_string(resume)?;
            let mut conversation =
                ConversationState::load(&run.file(constants::STATE_FILE))?.unwrap_or_default();
            conversation.previous_run = Some(run.path().display().to_string());
            info!(file = %resume.display(), "resuming from existing instructions");
            eprintln!("{}", "Resuming from existing instructions...".green().bold());
            let session = Session {
                run,
                conversation,
                in_git,
                applied_turns: 0,
            };
            session.save()?;
            return Ok((
                session,
                TurnState::AwaitingReview {
                    raw,
                    path: resume.clone(),
                },
            ));
        }

        let run = RunDir::create(&self.root().join(&self.config.pipeline.runs_dir))?;
        let session = Session {
            run,
            conversation: ConversationState::default(),
            in_git,
            applied_turns: 0,
        };
        session.save()?;
        Ok((session, TurnState::AwaitingPrompt))
    }

    async fn step(&self, session: &mut Session, state: TurnState) -> Result<TurnState, PipelineError> {
        let turn = session.conversation.turn_number;
        match state {
            TurnState::AwaitingPrompt => {
                let prompt_path = session.run.ensure_prompt(turn, self.root())?;
                let prompt = match self.initial_prompt(session, &prompt_path)? {
                    Some(text) => Some(text),
                    None => prompt::acquire_prompt(self.collab.editor.as_ref(), &prompt_path).await,
                };
                Ok(match prompt {
                    Some(prompt) => TurnState::PostProcessing {
                        prompt,
                        prompt_path,
                    },
                    None => {
                        info!("no prompt content provided, exiting pipeline");
                        eprintln!("{}", "Pipeline execution cancelled due to empty prompt.".yellow());
                        TurnState::Done
                    }
                })
            }

            TurnState::PostProcessing {
                prompt,
                prompt_path,
            } => {
                let prompt = self
                    .post_processor
                    .finalize(
                        &prompt,
                        &prompt_path,
                        &session.run,
                        turn,
                        self.collab.editor.as_ref(),
                        self.collab.confirm.as_ref(),
                    )
                    .await;
                Ok(TurnState::GeneratingInstructions { prompt })
            }

            TurnState::GeneratingInstructions { prompt } => {
                info!("generating instructions based on smart context and user prompt");
                let raw = self.generate(session, &prompt).await?;
                let path = session.run.raw_instructions_path(turn);
                crate::run::write_creating_parents(&path, &raw)?;
                info!(path = %path.display(), "saved raw instructions");
                session.save()?;
                Ok(TurnState::AwaitingReview { raw, path })
            }

            TurnState::AwaitingReview { raw, path } => {
                let raw = prompt::review(self.collab.editor.as_ref(), &path, &raw).await;
                Ok(TurnState::ApplyingEdits { raw })
            }

            TurnState::ApplyingEdits { raw } => {
                eprintln!("{}", "Processing instructions...".green().bold());
                self.apply(session, &raw, true).await?;
                session.applied_turns += 1;
                session.save()?;
                Ok(if self.config.pipeline.run_tests {
                    TurnState::RunningTests
                } else {
                    TurnState::AwaitingContinue
                })
            }

            TurnState::RunningTests => {
                eprintln!("{}", "Running unit tests...".cyan().bold());
                let output = self.collab.tests.run(self.root()).await;
                eprintln!("{output}");
                let path = session.run.test_results_path(turn);
                crate::run::write_creating_parents(&path, &output)?;
                info!(path = %path.display(), "wrote test results");
                test_runner::append_failed_results(&session.run, self.root(), &output, turn + 1)?;
                Ok(TurnState::AwaitingContinue)
            }

            TurnState::AwaitingContinue => {
                eprintln!(
                    "{}",
                    "Pipeline step completed. Waiting for user input...".cyan().bold()
                );
                let timeout = Duration::from_secs(self.config.pipeline.continue_timeout_secs);
                if self.collab.confirm.confirm_within(CONTINUE_QUESTION, timeout).await {
                    session.conversation.turn_number += 1;
                    session.save()?;
                    Ok(TurnState::AwaitingPrompt)
                } else {
                    Ok(TurnState::Done)
                }
            }

            TurnState::Done => Ok(TurnState::Done),
        }
    }

    /// Contents of `--prompt-file` for the first turn, copied into the
    /// turn's prompt file.
    fn initial_prompt(&self, session: &Session, prompt_path: &Path) -> Result<Option<String>, PipelineError> {
        let Some(file) = &self.options.prompt_file else {
            return Ok(None);
        };
        if session.conversation.turn_number != 1 {
            return Ok(None);
        }
        let content = crate::run::read_to_string(file)?.trim().to_string();
        if content.is_empty() {
            warn!(file = %file.display(), "prompt file is empty");
            return Ok(None);
        }
        crate::run::write_creating_parents(prompt_path, &content)?;
        info!(file = %file.display(), "using prompt from file");
        Ok(Some(content))
    }

    /// Send the prompt, offering a retry on transient provider errors.
    async fn generate(&self, session: &mut Session, prompt: &str) -> Result<String, PipelineError> {
        let builder = SmartContextBuilder::new(
            self.root(),
            &self.config.context,
            Arc::clone(&self.collab.fast),
            Arc::clone(&self.collab.counter),
            Arc::clone(&self.collab.confirm),
        );

        let mut attempt = 0;
        loop {
            match self.exchange(session, &builder, prompt).await {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    let reason = e
                        .provider_error()
                        .and_then(providers::classify_error)
                        .unwrap_or("Transient error");
                    let backoff = providers::retry_backoff(attempt);
                    warn!(reason, attempt, "instruction generation failed");
                    let question = format!(
                        "{reason}. Retry in {}s? (attempt {}/{})",
                        backoff.as_secs(),
                        attempt + 1,
                        MAX_RETRIES
                    );
                    if !self.collab.confirm.confirm(&question).await {
                        return Err(e.into());
                    }
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Seed the context on the first turn, then send the prompt.
    async fn exchange(
        &self,
        session: &mut Session,
        builder: &SmartContextBuilder,
        prompt: &str,
    ) -> Result<String, ConversationError> {
        self.engine
            .initialize(&mut session.conversation, builder, self.root(), prompt, &session.run)
            .await?;
        self.engine.send(&mut session.conversation, prompt).await
    }

    /// Apply one reply and return its instructions with processed paths.
    async fn apply(
        &self,
        session: &mut Session,
        raw: &str,
        create_branch: bool,
    ) -> Result<InstructionSet, PipelineError> {
        let reply = instructions::process_reply(raw);
        let mut set = reply.grouped();
        if let Some(preamble) = &reply.preamble {
            eprintln!("{}", preamble.dimmed());
        }

        if create_branch {
            self.maybe_create_branch(session, &reply).await;
        }

        let report = FileOperator::new(self.root(), &session.run).process(&mut set);
        if !report.created.is_empty() {
            eprintln!("{}", format!("Created {} new file(s)", report.created.len()).green());
        }
        if !report.scripts.is_empty() {
            eprintln!(
                "{}",
                format!(
                    "Saved {} bash script(s) to {} (not executed)",
                    report.scripts.len(),
                    crate::operator::BASH_SCRIPTS_DIR
                )
                .yellow()
            );
        }
        for (target, err) in &report.failed {
            eprintln!("{}", format!("Failed: {target}: {err}").red());
        }

        let service = PatchService::new(
            Arc::clone(&self.collab.fast),
            Arc::clone(&self.collab.large),
            Arc::clone(&self.collab.counter),
            &self.config.tiers,
            session.run.clone(),
        );
        let targets: Vec<String> = set.patches.iter().map(|p| p.file_path.clone()).collect();
        let progress = ProgressTracker::new(&targets, std::io::stderr().is_terminal());
        progress.start();
        let applied = PatchApplier::new(&service, self.root(), &session.run)
            .apply_all(&mut set.patches, &progress)
            .await;
        progress.finish();

        let json = ProcessedInstructions::new(&reply, &set).to_json()?;
        let saved = session.run.write(constants::PROCESSED_INSTRUCTIONS_FILE, &json)?;
        info!(path = %saved.display(), "saved processed instructions");

        if let Some(postamble) = &reply.postamble {
            eprintln!("{}", postamble.dimmed());
        }
        applied?;
        Ok(set)
    }

    /// Offer to merge a clean non-main branch into main.
    ///
    /// Returns the merged branch. Disabled together with branch creation.
    async fn merge_to_main(&self) -> Option<String> {
        if !self.config.pipeline.create_branches {
            return None;
        }
        let branch = git::current_branch(self.root()).await?;
        if branch == MAIN_BRANCH {
            return None;
        }
        if !self.collab.confirm.confirm(&merge_question(&branch)).await {
            return None;
        }
        match git::merge_into(self.root(), MAIN_BRANCH, &branch).await {
            Ok(()) => {
                info!(branch = %branch, "merged into {MAIN_BRANCH}");
                eprintln!(
                    "{}",
                    format!("Merged '{branch}' into '{MAIN_BRANCH}'. Start a new run to continue.")
                        .green()
                        .bold()
                );
                Some(branch)
            }
            Err(e) => {
                error!(branch = %branch, error = %e, "failed to merge into {MAIN_BRANCH}");
                eprintln!("{}", format!("Failed to merge '{branch}': {e}").red());
                None
            }
        }
    }

    async fn maybe_create_branch(&self, session: &Session, reply: &LlmReply) {
        let Some(commit) = reply.commit_name.as_deref() else {
            warn!("no commit name provided in the LLM response, skipping branch creation");
            return;
        };
        if !self.config.pipeline.create_branches || !session.in_git {
            return;
        }
        match git::has_uncommitted_changes(self.root()).await {
            Ok(false) => {}
            Ok(true) => {
                warn!("skipping branch creation due to uncommitted changes");
                return;
            }
            Err(e) => {
                error!(error = %e, "could not check for uncommitted changes");
                return;
            }
        }
        let branch = git::branch_name(&session.run.name(), commit);
        eprintln!("{}", format!("Creating new git branch: {branch}...").green().bold());
        match git::create_branch(self.root(), &branch).await {
            Ok(()) => info!(branch = %branch, "created and switched to new branch"),
            Err(e) => error!(branch = %branch, error = %e, "failed to create new git branch"),
        }
    }
}
