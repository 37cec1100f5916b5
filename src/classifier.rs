use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PipelineError;
use crate::llm::TextModel;

/// Moderation policy shown to every backend in the stack.
pub const SYSTEM_INSTRUCTION: &str = "\
You are an anti-spam moderator bot for a Telegram channel comments. You will be shown comment info from Telegram API as a json/dict. Classify the comment as spam or not spam.

Categories of spam:
-   Links aiming to sell something.
-   Bait messages luring a user to check the spammer account profile.
-   Comment posted after publication of a post impossibly quickly for a human. The difference between post date and comment date is stored in the \"comment_delay_seconds\" field.
-   Content unrelated to the post the comment is replying, \"reply_to_message\" field contains a sample of the post if present.
-   Porn, prostitution, gambling, crypto/NFT, get rich quick schemes and such.
Anything else is not spam. When in doubt, classify as not spam. We don't want to ruin the experience for legitimate commenters.

Answer format:
1. If spam: `{\"why\": \"explanation\", \"spam\": true}`. \"why\" should explain your reason in 4 words or less.
2. If not spam: `{\"spam\": false}`
Output as plain string, no formatting. For example:{\"why\": \"bait link\", \"spam\": true}";

/// The verdict is a single short JSON object; anything past this budget
/// is the model rambling.
const MAX_OUTPUT_TOKENS: u32 = 30;

const MAX_ATTEMPTS: u32 = 3;

/// The model's spam/not-spam answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub spam: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
}

/// Fixed-budget retry with no backoff. Each attempt re-walks the full
/// model stack from the top; the final error is returned, not swallowed.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last = None;
        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("Attempt {}/{} failed: {}", attempt, self.max_attempts, e);
                    last = Some(e);
                }
            }
        }
        Err(last.expect("retry budget must be at least 1 attempt"))
    }
}

#[derive(Debug, thiserror::Error)]
enum WalkFailure {
    #[error("{0:#}")]
    Backend(anyhow::Error),
    #[error("unparseable verdict: {raw}")]
    Parse {
        raw: String,
        source: serde_json::Error,
    },
}

/// Walks an ordered stack of interchangeable backends: the first entry
/// is the primary model, the rest are degraded fallbacks.
pub struct Classifier<M> {
    backend: M,
    stack: Vec<String>,
    retry: RetryPolicy,
}

impl<M: TextModel> Classifier<M> {
    pub fn new(backend: M, stack: Vec<String>) -> Self {
        Self {
            backend,
            stack,
            retry: RetryPolicy {
                max_attempts: MAX_ATTEMPTS,
            },
        }
    }

    /// Classify a prepared prompt.
    ///
    /// A per-backend failure advances to the next entry; exhausting the
    /// stack fails the attempt. The whole walk, verdict parsing
    /// included, gets the retry budget. A verdict that never parses
    /// surfaces as [`PipelineError::VerdictParse`] rather than a silent
    /// "not spam".
    pub async fn classify(&self, prompt: &str) -> Result<Verdict, PipelineError> {
        match self.retry.run(|| self.walk_stack(prompt)).await {
            Ok(verdict) => Ok(verdict),
            Err(WalkFailure::Backend(e)) => Err(PipelineError::Classification {
                attempts: self.retry.max_attempts,
                last: format!("{e:#}"),
            }),
            Err(WalkFailure::Parse { raw, source }) => {
                Err(PipelineError::VerdictParse { raw, source })
            }
        }
    }

    async fn walk_stack(&self, prompt: &str) -> Result<Verdict, WalkFailure> {
        let total = self.stack.len();
        let mut last_err = None;
        for (position, model) in self.stack.iter().enumerate() {
            match self
                .backend
                .generate(model, SYSTEM_INSTRUCTION, prompt, MAX_OUTPUT_TOKENS)
                .await
            {
                Ok(raw) => return parse_verdict(&raw),
                Err(e) => {
                    warn!(
                        "Model {} ({}/{}) failed: {:#}",
                        model,
                        position + 1,
                        total,
                        e
                    );
                    last_err = Some(e);
                }
            }
        }
        Err(WalkFailure::Backend(last_err.unwrap_or_else(|| {
            anyhow::anyhow!("model stack is empty")
        })))
    }
}

fn parse_verdict(raw: &str) -> Result<Verdict, WalkFailure> {
    // Lowercasing also fixes the occasional Python-flavored `True`.
    let normalized = raw.trim().to_lowercase();
    serde_json::from_str(&normalized).map_err(|source| WalkFailure::Parse {
        raw: normalized.clone(),
        source,
    })
}
