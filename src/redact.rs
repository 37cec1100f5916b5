use serde::Serialize;
use tracing::info;

use crate::error::PipelineError;

/// Main comment text cap, in characters.
const TEXT_CAP: usize = 1000;
/// Reply-context text/caption cap, in characters.
const REPLY_CAP: usize = 500;
const TRUNCATION_MARKER: &str = "...";

/// Sender fields as delivered by the transport, before redaction.
#[derive(Debug, Clone, Default)]
pub struct RawSender {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub is_premium: bool,
    pub is_bot: bool,
    pub is_channel: bool,
}

/// The replied-to post, before trimming.
#[derive(Debug, Clone)]
pub struct RawReply {
    pub text: Option<String>,
    pub caption: Option<String>,
    pub date: Option<i64>,
}

/// The documented subset of an incoming message that the pipeline reads.
/// Everything the transport attaches beyond these fields (chat linkage,
/// message ids, entity spans, forward lineage) never enters the record.
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    pub text: Option<String>,
    pub caption: Option<String>,
    pub date: Option<i64>,
    pub from: Option<RawSender>,
    pub sender_chat: Option<RawSender>,
    pub forward_origin_user: Option<RawSender>,
    pub reply_to: Option<RawReply>,
}

/// The resolved commenting entity. Carries the numeric id so the router
/// can check the whitelist; the id never appears inside the
/// [`CommentRecord`] sent to the model.
#[derive(Debug, Clone, Serialize)]
pub struct SenderIdentity {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub is_premium: bool,
    pub is_channel: bool,
}

/// Sender fields embedded in the model payload: no id, no bot flag.
#[derive(Debug, Clone, Serialize)]
pub struct SenderSnapshot {
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub is_premium: bool,
}

/// Trimmed excerpt of the replied-to post: caption/text and timestamp only.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<i64>,
}

/// The model-safe payload. Absent fields disappear from the serialized
/// form, so the prompt only ever shows what survived redaction.
#[derive(Debug, Clone, Serialize)]
pub struct CommentRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<i64>,
    pub from_user: SenderSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message: Option<ReplyContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_delay_seconds: Option<i64>,
}

/// Cap `text` at `max_chars` characters, appending a marker when cut.
/// Operates on chars, not bytes, so multibyte input can't split.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Resolve the true sender and build the redacted record.
///
/// Sender resolution order: the forwarded-message origin user (only when
/// `treat_forward_origin_as_sender` is set, used by the private test
/// flow), then the channel/chat identity the message was posted as, then
/// the direct sender. No candidate at all is an invariant violation.
pub fn redact(
    raw: &RawMessage,
    treat_forward_origin_as_sender: bool,
) -> Result<(SenderIdentity, CommentRecord), PipelineError> {
    let sender = resolve_sender(raw, treat_forward_origin_as_sender)
        .ok_or(PipelineError::MissingSender)?;

    let mut name = sender.first_name.clone();
    if let Some(last) = &sender.last_name {
        name.push(' ');
        name.push_str(last);
    }

    let identity = SenderIdentity {
        id: sender.id,
        name,
        username: sender.username.clone(),
        is_premium: sender.is_premium,
        is_channel: sender.is_channel,
    };

    let reply_to_message = raw.reply_to.as_ref().map(|reply| {
        // Once text is kept, the caption is dropped rather than sending
        // both excerpts to the model.
        let text = reply.text.as_deref().map(|t| truncate(t, REPLY_CAP));
        let caption = if text.is_some() {
            None
        } else {
            reply.caption.as_deref().map(|c| truncate(c, REPLY_CAP))
        };
        ReplyContext {
            text,
            caption,
            date: reply.date,
        }
    });

    let comment_delay_seconds = match (raw.date, reply_to_message.as_ref().and_then(|r| r.date)) {
        (Some(comment_date), Some(reply_date)) => Some(comment_date - reply_date),
        _ => None,
    };

    let record = CommentRecord {
        text: raw.text.as_deref().map(|t| truncate(t, TEXT_CAP)),
        caption: raw.caption.clone(),
        date: raw.date,
        from_user: SenderSnapshot {
            first_name: sender.first_name.clone(),
            last_name: sender.last_name.clone(),
            username: sender.username.clone(),
            is_premium: sender.is_premium,
        },
        reply_to_message,
        comment_delay_seconds,
    };

    info!(
        "Redacted comment from {}: {}",
        identity.id,
        serde_json::to_string(&record).unwrap_or_else(|e| format!("<serialize failed: {e}>"))
    );

    Ok((identity, record))
}

fn resolve_sender(raw: &RawMessage, treat_forward_origin_as_sender: bool) -> Option<&RawSender> {
    if treat_forward_origin_as_sender {
        if let Some(origin) = &raw.forward_origin_user {
            return Some(origin);
        }
    }
    raw.sender_chat.as_ref().or(raw.from.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sender(id: i64, first_name: &str) -> RawSender {
        RawSender {
            id,
            first_name: first_name.to_string(),
            ..Default::default()
        }
    }

    fn make_message(text: &str) -> RawMessage {
        RawMessage {
            text: Some(text.to_string()),
            date: Some(1_700_000_100),
            from: Some(make_sender(42, "Alice")),
            ..Default::default()
        }
    }

    #[test]
    fn direct_sender_is_used_by_default() {
        let raw = make_message("hello");
        let (identity, record) = redact(&raw, false).unwrap();
        assert_eq!(identity.id, 42);
        assert_eq!(identity.name, "Alice");
        assert_eq!(record.from_user.first_name, "Alice");
    }

    #[test]
    fn sender_chat_takes_priority_over_direct_sender() {
        let mut raw = make_message("hello");
        let mut channel = make_sender(-100, "Some Channel");
        channel.is_channel = true;
        raw.sender_chat = Some(channel);

        let (identity, _) = redact(&raw, false).unwrap();
        assert_eq!(identity.id, -100);
        assert!(identity.is_channel);
    }

    #[test]
    fn forward_origin_wins_only_when_requested() {
        let mut raw = make_message("hello");
        raw.forward_origin_user = Some(make_sender(7, "Bob"));

        let (ignored, _) = redact(&raw, false).unwrap();
        assert_eq!(ignored.id, 42);

        let (origin, _) = redact(&raw, true).unwrap();
        assert_eq!(origin.id, 7);
    }

    #[test]
    fn no_sender_candidate_is_an_error() {
        let raw = RawMessage {
            text: Some("orphan".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            redact(&raw, false),
            Err(PipelineError::MissingSender)
        ));
    }

    #[test]
    fn main_text_is_capped_at_1000_chars() {
        let mut raw = make_message("");
        raw.text = Some("x".repeat(1500));
        let (_, record) = redact(&raw, false).unwrap();
        let text = record.text.unwrap();
        assert_eq!(text.chars().count(), 1000 + TRUNCATION_MARKER.len());
        assert!(text.ends_with("..."));
    }

    #[test]
    fn reply_text_is_capped_at_500_chars_and_caption_dropped() {
        let mut raw = make_message("ok");
        raw.reply_to = Some(RawReply {
            text: Some("y".repeat(900)),
            caption: Some("a caption".to_string()),
            date: Some(1_700_000_000),
        });
        let (_, record) = redact(&raw, false).unwrap();
        let reply = record.reply_to_message.unwrap();
        let text = reply.text.unwrap();
        assert_eq!(text.chars().count(), 500 + TRUNCATION_MARKER.len());
        assert!(reply.caption.is_none());
    }

    #[test]
    fn reply_caption_survives_when_there_is_no_text() {
        let mut raw = make_message("ok");
        raw.reply_to = Some(RawReply {
            text: None,
            caption: Some("c".repeat(600)),
            date: Some(1_700_000_000),
        });
        let (_, record) = redact(&raw, false).unwrap();
        let reply = record.reply_to_message.unwrap();
        assert!(reply.text.is_none());
        let caption = reply.caption.unwrap();
        assert_eq!(caption.chars().count(), 500 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(1200);
        let capped = truncate(&text, 1000);
        assert_eq!(capped.chars().count(), 1000 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn short_text_is_left_untouched() {
        assert_eq!(truncate("short", 1000), "short");
    }

    #[test]
    fn delay_requires_both_timestamps() {
        let mut raw = make_message("fast reply");
        raw.reply_to = Some(RawReply {
            text: Some("the post".to_string()),
            caption: None,
            date: Some(1_700_000_098),
        });
        let (_, record) = redact(&raw, false).unwrap();
        assert_eq!(record.comment_delay_seconds, Some(2));

        raw.date = None;
        let (_, record) = redact(&raw, false).unwrap();
        assert!(record.comment_delay_seconds.is_none());

        raw.date = Some(1_700_000_100);
        raw.reply_to.as_mut().unwrap().date = None;
        let (_, record) = redact(&raw, false).unwrap();
        assert!(record.comment_delay_seconds.is_none());
    }

    #[test]
    fn delay_can_be_negative() {
        let mut raw = make_message("time traveler");
        raw.reply_to = Some(RawReply {
            text: Some("the post".to_string()),
            caption: None,
            date: Some(1_700_000_105),
        });
        let (_, record) = redact(&raw, false).unwrap();
        assert_eq!(record.comment_delay_seconds, Some(-5));
    }

    #[test]
    fn record_never_echoes_sender_id_or_bot_flag() {
        let raw = make_message("hello");
        let (_, record) = redact(&raw, false).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        let from_user = json.get("from_user").unwrap().as_object().unwrap();
        assert!(!from_user.contains_key("id"));
        assert!(!from_user.contains_key("is_bot"));
    }

    #[test]
    fn absent_fields_vanish_from_serialized_record() {
        let raw = make_message("hello");
        let (_, record) = redact(&raw, false).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("reply_to_message"));
        assert!(!obj.contains_key("comment_delay_seconds"));
        assert!(!obj.contains_key("caption"));
    }
}
