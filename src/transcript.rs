//! Chat transcript interpretation.
//!
//! `chat/submitMessage` answers with the whole transcript of the chat. Only
//! the last message is of interest to callers, plus the context files the
//! agent cited anywhere in the transcript.

use serde::Deserialize;
use serde_json::Value;

/// `type` tag of an interpretable transcript payload.
pub const TRANSCRIPT_TYPE: &str = "transcript";

/// A context file cited by a transcript message.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextFileRef {
    pub uri: FileUri,
    #[serde(default)]
    pub range: Option<LineRange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileUri {
    pub path: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LineRange {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Position {
    pub line: i64,
}

impl ContextFileRef {
    /// Render as `path:start-end`, or `None` when the ref has no range.
    pub fn render(&self) -> Option<String> {
        self.range
            .map(|r| format!("{}:{}-{}", self.uri.path, r.start.line, r.end.line))
    }
}

/// Speaker and text of the last transcript message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastMessage {
    pub speaker: String,
    pub text: String,
    /// Rendered context refs, in transcript order then array order.
    pub context_files: Vec<String>,
}

impl LastMessage {
    /// Whether the payload yielded no usable reply.
    pub fn is_empty(&self) -> bool {
        self.speaker.is_empty() || self.text.is_empty()
    }
}

/// Extract the last message of a transcript payload.
///
/// Anything that is not a `"transcript"` payload with a `messages` list
/// yields an empty [`LastMessage`]. With `want_context_files`, context refs
/// with a range are collected from every message, not just the last one.
/// Context entries of any other shape are skipped.
pub fn last_message(result: &Value, want_context_files: bool) -> LastMessage {
    if result.get("type").and_then(Value::as_str) != Some(TRANSCRIPT_TYPE) {
        return LastMessage::default();
    }

    let Some(messages) = result.get("messages").and_then(Value::as_array) else {
        tracing::debug!("Transcript without a messages list");
        return LastMessage::default();
    };
    let Some(last) = messages.last() else {
        return LastMessage::default();
    };

    let context_files = if want_context_files {
        messages
            .iter()
            .filter_map(|m| m.get("contextFiles").and_then(Value::as_array))
            .flatten()
            .filter_map(|entry| ContextFileRef::deserialize(entry).ok())
            .filter_map(|file| file.render())
            .collect()
    } else {
        Vec::new()
    };

    LastMessage {
        speaker: string_field(last, "speaker"),
        text: string_field(last, "text"),
        context_files,
    }
}

fn string_field(msg: &Value, key: &str) -> String {
    msg.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
