//! Size-tiered patch application through a language model.
//!
//! The original file is counted by the token service, routed to the fast
//! or large model, and the full updated file is recovered from the first
//! fenced block of the reply.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{error, info};

use super::PatchError;
use crate::config::TierConfig;
use crate::models::ChatMessage;
use crate::providers::{LanguageModel, TokenCounter};
use crate::run::{self, RunDir};

/// Prompt template for patch application.
pub const PATCH_PROMPT: &str = include_str!("../templates/patch_prompt.txt");

const FENCE: &str = "```";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("valid regex"));

/// Model capacity used for one patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Tier {
    Fast,
    Large,
}

/// Pick a tier for a file of `tokens`, or `None` when it fits neither.
pub fn select_tier(tokens: usize, tiers: &TierConfig) -> Option<Tier> {
    if tokens <= tiers.fast_token_limit {
        Some(Tier::Fast)
    } else if tokens <= tiers.large_token_limit {
        Some(Tier::Large)
    } else {
        None
    }
}

/// Fill `{name}` placeholders in a single pass.
///
/// Substituted values are never rescanned; unknown names stay as written.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            vars.iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Content between the first opening fence and the last closing fence.
pub fn extract_updated_content(reply: &str) -> Option<String> {
    let lines: Vec<&str> = reply.split('\n').collect();
    let start = lines
        .iter()
        .position(|l| l.trim().starts_with(FENCE))?;
    let body = &lines[start + 1..];
    let end = body.iter().rposition(|l| l.trim().starts_with(FENCE))?;
    Some(body[..end].join("\n"))
}

/// Applies patch descriptions to file contents.
pub struct PatchService {
    fast: Arc<dyn LanguageModel>,
    large: Arc<dyn LanguageModel>,
    counter: Arc<dyn TokenCounter>,
    tiers: TierConfig,
    run: RunDir,
}

impl PatchService {
    pub fn new(
        fast: Arc<dyn LanguageModel>,
        large: Arc<dyn LanguageModel>,
        counter: Arc<dyn TokenCounter>,
        tiers: &TierConfig,
        run: RunDir,
    ) -> Self {
        Self {
            fast,
            large,
            counter,
            tiers: tiers.clone(),
            run,
        }
    }

    /// Tier for `original_content`, counted by the token service.
    pub async fn tier_for(&self, original_content: &str, path: &str) -> Result<Tier, PatchError> {
        let tokens = self.counter.count(original_content).await?;
        select_tier(tokens, &self.tiers).ok_or_else(|| PatchError::TooLarge {
            path: path.to_string(),
            tokens,
            limit: self.tiers.large_token_limit,
        })
    }

    /// Return the full updated content of `path`.
    pub async fn apply_patch(
        &self,
        original_content: &str,
        patch_content: &str,
        path: &str,
    ) -> Result<String, PatchError> {
        let tier = self.tier_for(original_content, path).await?;
        self.apply_with_tier(tier, original_content, patch_content, path)
            .await
    }

    pub async fn apply_with_tier(
        &self,
        tier: Tier,
        original_content: &str,
        patch_content: &str,
        path: &str,
    ) -> Result<String, PatchError> {
        let model = match tier {
            Tier::Fast => &self.fast,
            Tier::Large => &self.large,
        };
        info!(path, %tier, model = model.model(), "applying patch");

        let prompt = render_template(
            PATCH_PROMPT.trim(),
            &[
                ("original_content", original_content),
                ("patch_content", patch_content),
            ],
        );
        let reply = model.generate(&[ChatMessage::user(prompt)], None).await?;
        self.store_reply(path, &reply, tier)?;

        extract_updated_content(&reply).ok_or_else(|| {
            error!(path, "LLM response does not contain properly formatted updated content");
            PatchError::MalformedOutput {
                path: path.to_string(),
            }
        })
    }

    fn store_reply(&self, path: &str, reply: &str, tier: Tier) -> Result<(), PatchError> {
        let saved = self.run.write(
            &format!("{}.{}.{tier}.txt", run::artifact_name(path), run::timestamp()),
            reply,
        )?;
        info!(path = %saved.display(), "saved patch model response");
        Ok(())
    }
}
