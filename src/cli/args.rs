//! Clap argument types.

use clap::Parser;
use std::path::PathBuf;

/// Interactive LLM code-edit pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "patchsmith",
    version = patchsmith::constants::VERSION,
    about = "Interactive LLM code-edit pipeline",
)]
pub struct Cli {
    /// Log filter (e.g. `debug`, `patchsmith=trace`). Overrides PATCHSMITH_LOG and RUST_LOG.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Also write logs to a file (default: runs/patchsmith.log).
    #[arg(
        long,
        global = true,
        num_args = 0..=1,
        default_missing_value = "runs/patchsmith.log",
        value_name = "PATH"
    )]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Run the interactive edit pipeline.
    Run(RunArgs),

    /// Build the smart context for a request.
    Context(ContextArgs),

    /// Parse a saved model reply and print the processed instructions.
    Parse(ParseArgs),

    /// List the tracked text files considered for context.
    Files(PathArgs),

    /// Print the declaration index.
    Declarations(PathArgs),

    /// Print version and build information.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the repository (default: current directory).
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Use this file as the first prompt instead of opening the editor.
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    /// Resume from a saved raw instructions file in an earlier run directory.
    #[arg(long, value_name = "RAW_INSTRUCTIONS")]
    pub resume: Option<PathBuf>,

    /// Include test files in the context.
    #[arg(long, default_value_t = false)]
    pub include_tests: bool,

    /// Editor command or alias (vscode, cursor, vim, ...).
    #[arg(long)]
    pub editor: Option<String>,

    /// Approve every confirmation without asking.
    #[arg(long, short = 'y', default_value_t = false)]
    pub yes: bool,

    /// Skip running the test suite between turns.
    #[arg(long, default_value_t = false)]
    pub no_tests: bool,

    /// Do not create a git branch per reply or offer to merge into main.
    #[arg(long, default_value_t = false)]
    pub no_branch: bool,

    /// Repair failing tests instead of prompting for a change.
    #[arg(long, default_value_t = false)]
    pub auto_fix_tests: bool,

    /// Maximum repair passes with --auto-fix-tests.
    #[arg(long, default_value_t = patchsmith::pipeline::autofix::MAX_FIX_ATTEMPTS, value_name = "N")]
    pub max_fix_attempts: u32,
}

/// Arguments for the `context` subcommand.
#[derive(Parser, Debug)]
pub struct ContextArgs {
    /// What you want to change.
    pub request: String,

    /// Path to the repository (default: current directory).
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Write the full initial context here instead of stdout.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Include test files in the context.
    #[arg(long, default_value_t = false)]
    pub include_tests: bool,

    /// Accept the model's selection without asking.
    #[arg(long, short = 'y', default_value_t = false)]
    pub yes: bool,
}

/// Arguments for the `parse` subcommand.
#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// File holding a raw model reply.
    pub file: PathBuf,
}

/// Arguments for commands that only need a project root.
#[derive(Parser, Debug)]
pub struct PathArgs {
    /// Path to the repository (default: current directory).
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Include test files.
    #[arg(long, default_value_t = false)]
    pub include_tests: bool,
}
