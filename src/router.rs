use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{Message, ParseMode};
use teloxide::utils::html;
use tracing::info;

use crate::classifier::Verdict;
use crate::config::Config;
use crate::error::PipelineError;
use crate::redact::{CommentRecord, SenderIdentity};

/// Why a comment skipped classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bypass {
    Whitelisted,
    Privileged,
}

/// Cheap checks that run before any model call.
pub fn bypass(config: &Config, sender: &SenderIdentity) -> Option<Bypass> {
    if config.is_whitelisted(sender.id) {
        return Some(Bypass::Whitelisted);
    }
    if sender.is_premium {
        return Some(Bypass::Privileged);
    }
    None
}

/// One block of an operator report.
pub enum Section<'a> {
    /// Plain line, rendered as-is.
    Text(&'a str),
    /// Preformatted block, HTML-escaped.
    Code(&'a str),
    /// Pretty-printed JSON in an escaped `<pre>` block.
    Json(serde_json::Value),
}

pub fn render_report(sections: &[Section<'_>]) -> String {
    sections
        .iter()
        .map(|section| match section {
            Section::Text(text) => (*text).to_string(),
            Section::Code(code) => format!("<pre>{}</pre>", html::escape(code)),
            Section::Json(value) => {
                let pretty = serde_json::to_string_pretty(value)
                    .unwrap_or_else(|e| format!("<render failed: {e}>"));
                format!("<pre>{}</pre>", html::escape(&pretty))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Send a multi-section HTML report to `chat_id`.
pub async fn send_report(
    bot: &Bot,
    chat_id: ChatId,
    sections: &[Section<'_>],
) -> Result<(), PipelineError> {
    bot.send_message(chat_id, render_report(sections))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Notify the operator with the structured evidence, then
/// forward the untouched original so it can be inspected as posted.
pub async fn report_spam(
    bot: &Bot,
    config: &Config,
    msg: &Message,
    sender: &SenderIdentity,
    record: &CommentRecord,
    verdict: &Verdict,
) -> Result<(), PipelineError> {
    info!(
        "Spam from {} ({}): {:?}",
        sender.name, sender.id, verdict.why
    );

    let admin = ChatId(config.admin_id);
    send_report(
        bot,
        admin,
        &[
            Section::Text("Spam detected"),
            Section::Text("User"),
            Section::Json(serde_json::to_value(sender).unwrap_or_default()),
            Section::Text("Comment"),
            Section::Json(serde_json::to_value(record).unwrap_or_default()),
            Section::Text("Result"),
            Section::Json(serde_json::to_value(verdict).unwrap_or_default()),
        ],
    )
    .await?;

    bot.forward_message(admin, msg.chat.id, msg.id).await?;

    // Enforcement stays disabled until the verdicts earn enough trust.
    // bot.delete_message(msg.chat.id, msg.id).await?;
    // bot.ban_chat_member(msg.chat.id, UserId(sender.id as u64)).await?;

    Ok(())
}
