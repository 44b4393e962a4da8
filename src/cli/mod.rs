//! CLI command definitions and logging setup.
//!
//! Uses clap derive macros for argument definitions.

pub mod args;

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use patchsmith::constants;
use patchsmith::env::Env;

/// Filter directive by precedence: flag, `PATCHSMITH_LOG`, `RUST_LOG`, `info`.
pub fn log_directive(flag: Option<&str>, env: &Env) -> String {
    flag.map(str::to_string)
        .or_else(|| env.var(constants::ENV_LOG))
        .or_else(|| env.var("RUST_LOG"))
        .unwrap_or_else(|| "info".to_string())
}

/// Install the global subscriber: stderr, plus a plain-text file when asked.
pub fn init_logging(level: Option<&str>, log_file: Option<&Path>, env: &Env) -> Result<()> {
    let directive = log_directive(level, env);
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter '{directive}'"))?;

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}
