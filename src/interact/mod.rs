//! Human-in-the-loop collaborators: yes/no questions and the editor.
//!
//! The pipeline only depends on the [`Confirm`] and [`Editor`] traits, so
//! tests and `--yes` runs can answer without a terminal.

pub mod editor;

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::{Mutex, oneshot};
use tracing::{info, warn};

pub use editor::{CommandEditor, Editor};

/// Interval between countdown messages.
pub const COUNTDOWN_INTERVAL: Duration = Duration::from_secs(30);

/// Errors from user-facing collaborators.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to launch editor '{command}': {source}")]
    EditorLaunch {
        command: String,
        source: std::io::Error,
    },

    #[error("editor '{command}' exited with {status}")]
    EditorExit { command: String, status: String },

    #[error("editor command is empty")]
    EmptyEditor,
}

/// Answers yes/no questions.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;

    /// Like [`Confirm::confirm`], but an unanswered question becomes "no"
    /// after `timeout`.
    async fn confirm_within(&self, question: &str, _timeout: Duration) -> bool {
        self.confirm(question).await
    }
}

/// `y`, `yes` and an empty answer approve.
pub fn is_approval(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "")
}

/// Interactive confirmation on stdin/stderr.
///
/// One buffered reader serves every question, so lines typed ahead of a
/// question answer the next ones.
pub struct TerminalConfirm<R = BufReader<Stdin>> {
    input: Mutex<R>,
}

impl TerminalConfirm {
    pub fn new() -> Self {
        Self::with_input(BufReader::new(tokio::io::stdin()))
    }
}

impl Default for TerminalConfirm {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: AsyncBufRead + Unpin + Send> TerminalConfirm<R> {
    pub fn with_input(input: R) -> Self {
        Self {
            input: Mutex::new(input),
        }
    }

    async fn ask(&self, question: &str) -> Option<String> {
        eprint!("{} {} ", question.bold(), "(Y/n)".dimmed());
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        let mut input = self.input.lock().await;
        match input.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Confirm for TerminalConfirm<R> {
    async fn confirm(&self, question: &str) -> bool {
        // A closed stdin means nobody can approve.
        let approved = self.ask(question).await.is_some_and(|a| is_approval(&a));
        info!(question, approved, "user confirmation");
        approved
    }

    async fn confirm_within(&self, question: &str, timeout: Duration) -> bool {
        let (stop_tx, stop_rx) = oneshot::channel();
        let countdown = tokio::spawn(countdown(timeout, COUNTDOWN_INTERVAL, stop_rx));

        let answer = tokio::time::timeout(timeout, self.ask(question)).await;

        let _ = stop_tx.send(());
        let _ = countdown.await;

        match answer {
            Ok(Some(a)) => is_approval(&a),
            Ok(None) => false,
            Err(_) => {
                warn!(secs = timeout.as_secs(), "no answer before timeout, assuming no");
                eprintln!("\n{}", "Time's up, stopping here.".yellow());
                false
            }
        }
    }
}

/// Approves (or rejects) everything without asking.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirm for AutoConfirm {
    async fn confirm(&self, question: &str) -> bool {
        info!(question, approved = self.0, "auto-answered confirmation");
        self.0
    }
}

/// `Time remaining: MM:SS`.
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("Time remaining: {:02}:{:02}", secs / 60, secs % 60)
}

/// Print the remaining time every `every` until stopped or expired.
async fn countdown(total: Duration, every: Duration, mut stop: oneshot::Receiver<()>) {
    let start = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let remaining = total.saturating_sub(start.elapsed());
                if remaining.is_zero() {
                    break;
                }
                eprintln!("\n{}", format_remaining(remaining).yellow());
            }
        }
    }
}
