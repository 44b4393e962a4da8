//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags (applied by the binary)
//! 2. Environment variables
//! 3. `.patchsmith.toml` in repo root
//! 4. `~/.config/patchsmith/config.toml` (global defaults)
//! 5. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::constants;
use crate::env::Env;
use crate::models::ProviderName;

/// Errors during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub tiers: TierConfig,
    pub context: ContextConfig,
    pub pipeline: PipelineConfig,
    pub tokens: TokenConfig,
}

/// LLM provider used for instruction generation.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: ProviderName,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: ProviderName::Anthropic,
            model: "claude-3-5-sonnet-20240620".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

impl ProviderConfig {
    /// Same provider and credentials, different model.
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }
}

/// Size tiers for patch application and the cheap helper calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Model for small files, summaries, selection and prompt rewriting.
    pub fast_model: String,
    /// Model for files above `fast_token_limit`.
    pub large_model: String,
    pub fast_token_limit: usize,
    pub large_token_limit: usize,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            fast_model: "claude-3-haiku-20240307".to_string(),
            large_model: "claude-3-5-sonnet-20240620".to_string(),
            fast_token_limit: 3500,
            large_token_limit: 7500,
        }
    }
}

/// How file names returned by the selection model are matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Token matches any path containing it.
    #[default]
    Substring,
    /// Token must equal a path's final component.
    Basename,
}

/// Context selection and assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub include_tests: bool,
    /// Extensions eligible for concatenation.
    pub extensions: Vec<String>,
    /// Glob list, one pattern per line, relative to the repo root.
    pub always_include_file: String,
    /// YAML summary cache, relative to the repo root.
    pub summary_file: String,
    /// Characters of each file sent to the summarizer.
    pub summary_char_limit: usize,
    pub matcher: MatchStrategy,
}

/// Extensions concatenated into the context by default.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".html", ".css", ".info", ".http", ".tsx", ".vue", ".mjs", ".rules", ".sh",
    ".json", ".ts", ".yaml", ".env", ".md", ".jsonl", ".svelte", ".d.ts",
];

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            include_tests: false,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            always_include_file: "always_include_patterns.txt".to_string(),
            summary_file: "file_summaries.yaml".to_string(),
            summary_char_limit: 20_000,
            matcher: MatchStrategy::Substring,
        }
    }
}

/// Interactive pipeline behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Editor command; invoked as `<editor> --wait <file>`.
    pub editor: String,
    /// Directory (relative to the repo root) holding run directories.
    pub runs_dir: String,
    /// Prompts longer than this are offered for rewriting.
    pub post_process_char_limit: usize,
    /// Seconds to wait on the "continue?" question before answering no.
    pub continue_timeout_secs: u64,
    /// Create a branch named after the reply's commit tag.
    pub create_branches: bool,
    pub run_tests: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            editor: "code".to_string(),
            runs_dir: "runs".to_string(),
            post_process_char_limit: 100_000,
            continue_timeout_secs: 300,
            create_branches: true,
            run_tests: true,
        }
    }
}

/// Token counting service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-haiku-20240307".to_string(),
        }
    }
}

impl Config {
    /// Load configuration with proper layering.
    pub fn load(repo_root: Option<&Path>, env: &Env) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                config.merge(global);
            }
        }

        if let Some(root) = repo_root {
            let local_path = root.join(constants::CONFIG_FILENAME);
            if local_path.exists() {
                let local = Self::load_file(&local_path)?;
                config.merge(local);
            }
        }

        config.apply_env_vars(env);

        Ok(config)
    }

    /// Load a config from a specific file.
    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(constants::CONFIG_DIR).join("config.toml"))
    }

    /// Merge another config into this one; fields of `other` that differ
    /// from the built-in default win.
    fn merge(&mut self, other: Config) {
        let dp = ProviderConfig::default();
        if other.provider.name != dp.name {
            self.provider.name = other.provider.name;
        }
        if other.provider.model != dp.model {
            self.provider.model = other.provider.model;
        }
        if other.provider.base_url.is_some() {
            self.provider.base_url = other.provider.base_url;
        }
        if other.provider.api_key.is_some() {
            self.provider.api_key = other.provider.api_key;
        }

        let dt = TierConfig::default();
        if other.tiers.fast_model != dt.fast_model {
            self.tiers.fast_model = other.tiers.fast_model;
        }
        if other.tiers.large_model != dt.large_model {
            self.tiers.large_model = other.tiers.large_model;
        }
        if other.tiers.fast_token_limit != dt.fast_token_limit {
            self.tiers.fast_token_limit = other.tiers.fast_token_limit;
        }
        if other.tiers.large_token_limit != dt.large_token_limit {
            self.tiers.large_token_limit = other.tiers.large_token_limit;
        }

        let dc = ContextConfig::default();
        if other.context.include_tests {
            self.context.include_tests = true;
        }
        if other.context.extensions != dc.extensions {
            self.context.extensions = other.context.extensions;
        }
        if other.context.always_include_file != dc.always_include_file {
            self.context.always_include_file = other.context.always_include_file;
        }
        if other.context.summary_file != dc.summary_file {
            self.context.summary_file = other.context.summary_file;
        }
        if other.context.summary_char_limit != dc.summary_char_limit {
            self.context.summary_char_limit = other.context.summary_char_limit;
        }
        if other.context.matcher != dc.matcher {
            self.context.matcher = other.context.matcher;
        }

        let dpl = PipelineConfig::default();
        if other.pipeline.editor != dpl.editor {
            self.pipeline.editor = other.pipeline.editor;
        }
        if other.pipeline.runs_dir != dpl.runs_dir {
            self.pipeline.runs_dir = other.pipeline.runs_dir;
        }
        if other.pipeline.post_process_char_limit != dpl.post_process_char_limit {
            self.pipeline.post_process_char_limit = other.pipeline.post_process_char_limit;
        }
        if other.pipeline.continue_timeout_secs != dpl.continue_timeout_secs {
            self.pipeline.continue_timeout_secs = other.pipeline.continue_timeout_secs;
        }
        // Switches that default to on can only be turned off by a layer.
        if !other.pipeline.create_branches {
            self.pipeline.create_branches = false;
        }
        if !other.pipeline.run_tests {
            self.pipeline.run_tests = false;
        }

        let dtk = TokenConfig::default();
        if other.tokens.base_url != dtk.base_url {
            self.tokens.base_url = other.tokens.base_url;
        }
        if other.tokens.model != dtk.model {
            self.tokens.model = other.tokens.model;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_vars(&mut self, env: &Env) {
        if let Some(val) = env.var(constants::ENV_PROVIDER) {
            match ProviderName::parse_with_hint(&val) {
                Ok(name) => self.provider.name = name,
                Err(e) => warn!("ignoring {}: {e}", constants::ENV_PROVIDER),
            }
        }
        if let Some(val) = env.var(constants::ENV_MODEL) {
            self.provider.model = val;
        }
        if let Some(val) = env.var(constants::ENV_BASE_URL) {
            self.provider.base_url = Some(val);
        }

        let api_key = env
            .var(constants::ENV_API_KEY)
            .or_else(|| env.var(self.provider.name.api_key_env_var()));
        if api_key.is_some() {
            self.provider.api_key = api_key;
        }

        if let Some(val) = env.var(constants::ENV_EDITOR) {
            self.pipeline.editor = val;
        }
        match env.flag(constants::ENV_INCLUDE_TESTS) {
            Some(Ok(flag)) => self.context.include_tests = flag,
            Some(Err(raw)) => warn!("ignoring invalid {} value: {raw}", constants::ENV_INCLUDE_TESTS),
            None => {}
        }
        match env.parsed::<usize>(constants::ENV_POST_PROCESS_CHAR_LIMIT) {
            Some(Ok(limit)) => self.pipeline.post_process_char_limit = limit,
            Some(Err(raw)) => warn!(
                "ignoring invalid {} value: {raw}",
                constants::ENV_POST_PROCESS_CHAR_LIMIT
            ),
            None => {}
        }
    }

    /// Anthropic key for the token counter, when one is available.
    ///
    /// Uses the configured key when the provider is Anthropic, otherwise
    /// falls back to `ANTHROPIC_API_KEY`.
    pub fn token_counter_key(&self, env: &Env) -> Option<String> {
        if self.provider.name == ProviderName::Anthropic {
            if let Some(key) = &self.provider.api_key {
                return Some(key.clone());
            }
        }
        env.var(ProviderName::Anthropic.api_key_env_var())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> Env {
        Env::mock(Vec::<(&str, &str)>::new())
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.provider.name, ProviderName::Anthropic);
        assert_eq!(config.tiers.fast_token_limit, 3500);
        assert_eq!(config.tiers.large_token_limit, 7500);
        assert!(!config.context.include_tests);
        assert!(config.context.extensions.contains(&".d.ts".to_string()));
        assert_eq!(config.pipeline.post_process_char_limit, 100_000);
        assert_eq!(config.context.matcher, MatchStrategy::Substring);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[provider]
name = "openai"
model = "gpt-4o"

[tiers]
fast_token_limit = 2000

[context]
include_tests = true
matcher = "basename"

[pipeline]
editor = "cursor"
create_branches = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider.name, ProviderName::OpenAI);
        assert_eq!(config.tiers.fast_token_limit, 2000);
        assert_eq!(config.tiers.large_token_limit, 7500);
        assert!(config.context.include_tests);
        assert_eq!(config.context.matcher, MatchStrategy::Basename);
        assert_eq!(config.pipeline.editor, "cursor");
        assert!(!config.pipeline.create_branches);
    }

    #[test]
    fn merge_overrides_non_default_values() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.provider.model = "claude-3-opus-20240229".to_string();
        other.tiers.large_token_limit = 9000;
        other.context.include_tests = true;
        other.pipeline.run_tests = false;
        other.tokens.base_url = "http://localhost:9999".to_string();

        base.merge(other);

        assert_eq!(base.provider.model, "claude-3-opus-20240229");
        assert_eq!(base.tiers.large_token_limit, 9000);
        assert!(base.context.include_tests);
        assert!(!base.pipeline.run_tests);
        assert_eq!(base.tokens.base_url, "http://localhost:9999");
    }

    #[test]
    fn merge_keeps_base_when_other_is_default() {
        let mut base = Config::default();
        base.pipeline.editor = "vim".to_string();
        base.tiers.fast_token_limit = 1000;

        base.merge(Config::default());

        assert_eq!(base.pipeline.editor, "vim");
        assert_eq!(base.tiers.fast_token_limit, 1000);
    }

    #[test]
    fn load_file_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid {{ toml").unwrap();

        let err = Config::load_file(&path).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn load_from_repo_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".patchsmith.toml"),
            "[tiers]\nfast_model = \"tiny\"\n",
        )
        .unwrap();

        let config = Config::load(Some(dir.path()), &no_env()).unwrap();
        assert_eq!(config.tiers.fast_model, "tiny");
    }

    #[test]
    fn env_overrides_provider_and_key() {
        let env = Env::mock([
            ("PATCHSMITH_PROVIDER", "groq"),
            ("PATCHSMITH_API_KEY", "gsk-test"),
            ("PATCHSMITH_EDITOR", "vim"),
        ]);
        let mut config = Config::default();
        config.apply_env_vars(&env);
        assert_eq!(config.provider.name, ProviderName::Groq);
        assert_eq!(config.provider.api_key.as_deref(), Some("gsk-test"));
        assert_eq!(config.pipeline.editor, "vim");
    }

    #[test]
    fn env_provider_specific_key_fallback() {
        let env = Env::mock([("ANTHROPIC_API_KEY", "sk-ant")]);
        let mut config = Config::default();
        config.apply_env_vars(&env);
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-ant"));
    }

    #[test]
    fn env_invalid_values_are_ignored() {
        let env = Env::mock([
            ("PATCHSMITH_PROVIDER", "not-a-provider"),
            ("POST_PROCESS_CHAR_LIMIT", "lots"),
            ("PATCHSMITH_INCLUDE_TESTS", "perhaps"),
        ]);
        let mut config = Config::default();
        config.apply_env_vars(&env);
        assert_eq!(config.provider.name, ProviderName::Anthropic);
        assert_eq!(config.pipeline.post_process_char_limit, 100_000);
        assert!(!config.context.include_tests);
    }

    #[test]
    fn env_numeric_and_flag_values_apply() {
        let env = Env::mock([
            ("POST_PROCESS_CHAR_LIMIT", "5000"),
            ("PATCHSMITH_INCLUDE_TESTS", "true"),
        ]);
        let mut config = Config::default();
        config.apply_env_vars(&env);
        assert_eq!(config.pipeline.post_process_char_limit, 5000);
        assert!(config.context.include_tests);
    }

    #[test]
    fn token_counter_key_prefers_configured_anthropic_key() {
        let mut config = Config::default();
        config.provider.api_key = Some("sk-config".to_string());
        let env = Env::mock([("ANTHROPIC_API_KEY", "sk-env")]);
        assert_eq!(config.token_counter_key(&env).as_deref(), Some("sk-config"));

        config.provider.name = ProviderName::OpenAI;
        assert_eq!(config.token_counter_key(&env).as_deref(), Some("sk-env"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut provider = ProviderConfig::default();
        provider.api_key = Some("sk-secret".to_string());
        let debug = format!("{provider:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
