//! App-wide constants.
//!
//! Centralises the tool name, config paths, artifact names and environment
//! variable names so a rename only requires changing this file.

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "patchsmith";

/// Package version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Target triple the binary was compiled for (set by `build.rs`).
pub const TARGET: &str = env!("TARGET");

/// Local config filename (e.g. `.patchsmith.toml` in repo root).
pub const CONFIG_FILENAME: &str = ".patchsmith.toml";

/// Directory name under `~/.config/` for global config.
pub const CONFIG_DIR: &str = "patchsmith";

/// Per-repository directory holding template overrides.
pub const PROJECT_DIR: &str = ".patchsmith";

/// Version of the persisted conversation state schema.
pub const STATE_VERSION: u32 = 2;

// ── Run artifact names ──────────────────────────────────────────────

pub const STATE_FILE: &str = "conversation_state.json";
pub const PROCESSED_INSTRUCTIONS_FILE: &str = "processed_instructions.json";
pub const DECLARATIONS_FILE: &str = "declarations.txt";
pub const SMART_CONTEXT_FILE: &str = "smart_context.txt";
pub const INITIAL_CONTEXT_FILE: &str = "initial_context_final_content.txt";
pub const POST_PROCESSED_PROMPT_FILE: &str = "post_processed_prompt.md";
pub const PROMPT_TEMPLATE_FILE: &str = "prompt_template.md";
pub const LOG_FILE: &str = "patchsmith.log";

// ── Environment variable names ──────────────────────────────────────

pub const ENV_PROVIDER: &str = "PATCHSMITH_PROVIDER";
pub const ENV_MODEL: &str = "PATCHSMITH_MODEL";
pub const ENV_API_KEY: &str = "PATCHSMITH_API_KEY";
pub const ENV_BASE_URL: &str = "PATCHSMITH_BASE_URL";
pub const ENV_EDITOR: &str = "PATCHSMITH_EDITOR";
pub const ENV_INCLUDE_TESTS: &str = "PATCHSMITH_INCLUDE_TESTS";
pub const ENV_POST_PROCESS_CHAR_LIMIT: &str = "POST_PROCESS_CHAR_LIMIT";
pub const ENV_LOG: &str = "PATCHSMITH_LOG";
