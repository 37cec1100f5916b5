use crate::redact::CommentRecord;

/// Serialize the redacted record into the prompt sent to the model.
///
/// Built once per classification call; retries reuse the same string so
/// every attempt sees an identical prompt.
pub fn build_prompt(record: &CommentRecord) -> String {
    let json = serde_json::to_string(record).unwrap_or_else(|e| format!("<serialize failed: {e}>"));
    format!("Comment: {json}\n\nAnswer:")
}
