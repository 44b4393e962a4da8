//! Test repair loop.
//!
//! Runs the suite, asks the instruction model to fix the first failure,
//! applies the reply and runs the suite again, for a bounded number of
//! user-approved passes.

use std::path::PathBuf;

use colored::Colorize;
use tracing::{error, info};

use super::{Pipeline, PipelineError, Session};
use crate::conversation::ConversationState;
use crate::files::git;
use crate::run::{self, RunDir};
use crate::test_runner;

pub const MAX_FIX_ATTEMPTS: u32 = 3;

/// Stand-in target when the output names no failing test.
pub const GENERAL_ERROR: &str = "general error";

/// Prompt asking for a fix of `first_failed` only.
pub fn fix_prompt(first_failed: &str, output: &str) -> String {
    format!(
        "Focus on fixing only the first failed test: {first_failed}. \
         The codebase context is already included by default. \
         Do not attempt to fix any other tests at this time. \
         Analyze the following pytest output and suggest a fix:\n\n{output}\n\
         Provide your fix in the form of a patch that can be applied to the relevant file. \
         If the error is related to missing dependencies, suggest the correct pip install command."
    )
}

pub fn another_pass_question(attempt: u32) -> String {
    format!("Attempt {attempt} completed. Do you want to try another auto-fix pass?")
}

/// How a repair loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    /// pytest could not be started.
    RunnerFailed,
    AlreadyPassing,
    Passing,
    StillFailing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixReport {
    pub run_dir: PathBuf,
    pub attempts: u32,
    pub outcome: FixOutcome,
}

impl Pipeline {
    /// Repair failing tests, at most `max_attempts` passes.
    ///
    /// Each pass gets its own conversation turn in a fresh run directory;
    /// test output is saved as `test_results_fix_{n}.txt`, `0` being the
    /// initial run.
    pub async fn auto_fix_tests(&self, max_attempts: u32) -> Result<FixReport, PipelineError> {
        let run = RunDir::create(&self.root().join(&self.config.pipeline.runs_dir))?;
        let mut session = Session {
            run,
            conversation: ConversationState::default(),
            in_git: git::is_git_repo(self.root()).await,
            applied_turns: 0,
        };
        session.save()?;
        info!(run = %session.run.path().display(), "starting auto-fix");

        let mut output = self.collab.tests.run(self.root()).await;
        eprintln!("\n{}", "Initial Test Results:".cyan());
        eprintln!("{output}");
        session.run.write("test_results_fix_0.txt", &output)?;

        let run_dir = session.run.path().to_path_buf();
        if output.starts_with(test_runner::RUNNER_ERROR_PREFIX) {
            error!("error running pytest, exiting auto-fix");
            eprintln!("\n{}", output.red());
            return Ok(FixReport {
                run_dir,
                attempts: 0,
                outcome: FixOutcome::RunnerFailed,
            });
        }
        if test_runner::check_test_results(&output) {
            info!("all tests passed");
            eprintln!("\n{}", "All tests passed!".green());
            return Ok(FixReport {
                run_dir,
                attempts: 0,
                outcome: FixOutcome::AlreadyPassing,
            });
        }

        match test_runner::first_failed_test(&output) {
            Some(name) => eprintln!("\n{}", format!("First failed test or error: {name}").yellow()),
            None => eprintln!(
                "\n{}",
                "No specific test failure identified. There might be a general error.".yellow()
            ),
        }

        let mut attempts = 0;
        let mut outcome = FixOutcome::StillFailing;
        for attempt in 1..=max_attempts {
            attempts = attempt;
            info!(attempt, "auto-fix attempt");
            session.conversation.turn_number = attempt;

            if self.fix_once(&mut session, &output).await? {
                output = self.collab.tests.run(self.root()).await;
                eprintln!("\n{}", format!("Test Results after fix attempt {attempt}:").cyan());
                eprintln!("{output}");
                session.run.write(&format!("test_results_fix_{attempt}.txt"), &output)?;
                if test_runner::check_test_results(&output) {
                    info!(attempt, "all tests passed after auto-fix");
                    eprintln!("\n{}", "All tests passed after auto-fix attempts!".green());
                    outcome = FixOutcome::Passing;
                    break;
                }
            } else {
                info!(attempt, "no fixes could be applied");
            }

            if attempt == max_attempts {
                eprintln!("{}", "Reached maximum number of auto-fix attempts.".yellow());
            } else if !self.collab.confirm.confirm(&another_pass_question(attempt)).await {
                eprintln!("{}", "Auto-fix process ended by user.".yellow());
                break;
            }
        }

        session.save()?;
        info!(attempts, ?outcome, "completed auto-fix attempts");
        Ok(FixReport {
            run_dir,
            attempts,
            outcome,
        })
    }

    /// Ask for and apply one fix. True when the reply edited files.
    async fn fix_once(&self, session: &mut Session, output: &str) -> Result<bool, PipelineError> {
        let failing =
            test_runner::first_failed_test(output).unwrap_or_else(|| GENERAL_ERROR.to_string());
        let prompt = fix_prompt(&failing, output);

        let raw = self.generate(session, &prompt).await?;
        let path = session.run.raw_instructions_path(session.conversation.turn_number);
        run::write_creating_parents(&path, &raw)?;
        session.save()?;

        let set = self.apply(session, &raw, false).await?;
        let edited = !set.patches.is_empty() || !set.new_files.is_empty();
        if edited {
            session.applied_turns += 1;
            info!(test = %failing, "applied fix");
        } else {
            info!(test = %failing, "no fix could be determined");
        }
        Ok(edited)
    }
}
