use teloxide::prelude::*;
use teloxide::types::Message;
use tracing::error;

use crate::config::Config;
use crate::error::PipelineError;
use crate::redact::truncate;
use crate::router::{send_report, Section};

/// Event text cap in the diagnostic report, in characters.
const EVENT_TEXT_CAP: usize = 200;
/// How much of the error chain tail to ship, in characters.
const TRACE_TAIL: usize = 300;

/// Best-effort diagnostic notification to the operator chat.
///
/// Never propagates: a failed escalation is only worth a log line, the
/// caller already has the real error in hand and decides fatality via
/// [`PipelineError::is_fatal`].
pub async fn report(bot: &Bot, config: &Config, msg: Option<&Message>, err: &PipelineError) {
    error!("Exception while handling an update: {}", error_chain(err));

    let event_text = msg
        .and_then(|m| m.text().or_else(|| m.caption()))
        .map(|t| truncate(t, EVENT_TEXT_CAP));

    let chain = error_chain(err);
    let trace = tail(&chain, TRACE_TAIL);

    let mut sections = vec![Section::Text("Exception")];
    if let Some(text) = &event_text {
        sections.push(Section::Text("Message"));
        sections.push(Section::Code(text));
    }
    sections.push(Section::Text("Trace"));
    sections.push(Section::Code(trace));

    if let Err(e) = send_report(bot, ChatId(config.admin_id), &sections).await {
        error!("Failed to deliver escalation report: {}", e);
    }
}

/// Render the error with its full source chain.
fn error_chain(err: &PipelineError) -> String {
    let mut out = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// Last `max_chars` characters of `s`, on char boundaries.
fn tail(s: &str, max_chars: usize) -> &str {
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    match s.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_short_strings_whole() {
        assert_eq!(tail("short trace", 300), "short trace");
    }

    #[test]
    fn tail_returns_the_last_chars() {
        let long = format!("{}END", "x".repeat(500));
        let t = tail(&long, 300);
        assert_eq!(t.chars().count(), 300);
        assert!(t.ends_with("END"));
    }

    #[test]
    fn tail_respects_char_boundaries() {
        let long = "é".repeat(400);
        let t = tail(&long, 300);
        assert_eq!(t.chars().count(), 300);
    }

    #[test]
    fn chain_includes_the_parse_source() {
        let source = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        let err = PipelineError::VerdictParse {
            raw: "nope".to_string(),
            source,
        };
        let chain = error_chain(&err);
        assert!(chain.contains("not a valid verdict"));
        assert!(chain.contains("caused by: "));
    }
}
