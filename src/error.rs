use thiserror::Error;

/// Failures that can escape the moderation pipeline.
///
/// Per-backend call failures are not represented here: the classifier
/// absorbs them while walking the model stack and only surfaces
/// [`PipelineError::Classification`] once the whole stack and retry
/// budget are spent.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No resolvable sender on an incoming message. This is an invariant
    /// violation in the data we got from Telegram, not a recoverable
    /// condition.
    #[error("could not resolve a sender for the incoming message")]
    MissingSender,

    /// Every backend in the model stack failed on every retry attempt.
    #[error("all model backends exhausted after {attempts} attempt(s): {last}")]
    Classification { attempts: u32, last: String },

    /// The model produced output that does not parse as a verdict.
    /// Never coerced to "not spam": ambiguous output must not bypass
    /// moderation silently.
    #[error("model output is not a valid verdict: {raw}")]
    VerdictParse {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    /// A failure from the Telegram transport itself. Treated as fatal:
    /// the process terminates and relies on external supervision to
    /// restart it.
    #[error("telegram transport failure")]
    Transport(#[from] teloxide::RequestError),
}

impl PipelineError {
    /// Transport failures are assumed unrecoverable within the current
    /// process; everything else leaves the bot running.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Transport(_))
    }
}
