//! Raw record parsing and classification into `Message`/`UsageSample`.
//!
//! The source corpus is not a clean internally-tagged enum: `subtype` only
//! exists on `system` records, and the shape of `content` differs between
//! `user` and `assistant` records. Dispatch is therefore a function over a
//! `serde_json::Value` rather than a derived `#[serde(tag = ...)]` enum.

use std::path::Path;

use chrono::DateTime;
use chrono::Utc;
use serde_json::Value;

use crate::types::Message;
use crate::types::MessageRole;
use crate::types::Project;
use crate::types::UsageSample;

/// Marker substrings that mean a `user`-role record is synthetic
/// (machine-generated) content rather than something a human typed.
const SYNTHETIC_MARKERS: &[&str] = &[
    "system-reminder>",
    "antml:function_calls",
    "antml:invoke",
    "<command-message>",
    "</command-message>",
    "<command-name>",
    "</command-name>",
    "(no content)",
    "<local-command-stdout>",
    "<user-memory-input>",
    "Your todo list has changed",
    "This is a reminder that your todo list",
    "[{'type':",
    "{\"type\":",
    "analyzing your codebase",
    "Caveat: ",
];

const CONTINUATION_PREFIX: &str = "This session is being continued from a previous conversation";

/// Render a JSON value the way Python's `str()` renders the equivalent
/// object parsed by `json.loads` -- single-quoted strings and keys,
/// `True`/`False`/`None` -- so that list-shaped `content` can be
/// re-checked against the same marker table a plain string would be.
/// Relies on `serde_json`'s `preserve_order` feature so object key order
/// matches the source JSON (and therefore the dict's insertion order in
/// Python) rather than an alphabetized `BTreeMap` order.
fn python_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Value::Array(items) => {
            let inner = items.iter().map(python_repr).collect::<Vec<_>>().join(", ");
            format!("[{inner}]")
        }
        Value::Object(map) => {
            let inner = map
                .iter()
                .map(|(k, v)| format!("'{k}': {}", python_repr(v)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{inner}}}")
        }
    }
}

/// Result of classifying one raw JSONL line: zero or one `Message`, plus
/// zero or one `UsageSample` (an assistant record can yield both, either,
/// or neither).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClassifiedRecord {
    pub message: Option<Message>,
    pub usage: Option<UsageSample>,
}

/// Tracks `logicalParentUuid` seen on a `system`/`compact_boundary` record
/// until the next real `user` message in the same file claims it.
#[derive(Debug, Default)]
pub struct ClassifierState {
    pending_continuation: Option<String>,
}

impl ClassifierState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Returns true if `content` looks machine-generated rather than
/// human-authored, per the synthetic-content predicate.
pub fn is_synthetic_user_content(content: &str) -> bool {
    if serde_json::from_str::<Value>(content)
        .map(|v| v.is_object() || v.is_array())
        .unwrap_or(false)
    {
        return true;
    }
    if SYNTHETIC_MARKERS.iter().any(|marker| content.contains(marker)) {
        return true;
    }
    let trimmed = content.trim();
    if (trimmed.starts_with("[{") && trimmed.ends_with("}]"))
        || (trimmed.starts_with("{{") && trimmed.ends_with("}}"))
    {
        return true;
    }
    if content.contains("Please analyze this codebase and create a CLAUDE.md file") {
        return true;
    }
    false
}

fn parse_timestamp(record: &Value) -> Option<DateTime<Utc>> {
    record
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn first_content_block<'a>(content: &'a Value) -> Option<&'a Value> {
    content.as_array().and_then(|blocks| blocks.first())
}

fn extract_usage(record: &Value, timestamp: DateTime<Utc>) -> Option<UsageSample> {
    let usage = record.get("message").and_then(|m| m.get("usage"))?;
    let model = record
        .get("message")
        .and_then(|m| m.get("model"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let as_u64 = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
    Some(UsageSample {
        timestamp,
        model,
        input_tokens: as_u64("input_tokens"),
        output_tokens: as_u64("output_tokens"),
        cache_creation_tokens: as_u64("cache_creation_input_tokens"),
        cache_read_tokens: as_u64("cache_read_input_tokens"),
    })
}

/// Classify one already-JSON-parsed raw record.
///
/// `path` and `project` are attached to any produced `Message`. `state`
/// carries pending continuation linkage across calls for the same file and
/// must be threaded in file order.
pub fn classify_record(
    record: &Value,
    path: &Path,
    project: &Project,
    state: &mut ClassifierState,
) -> ClassifiedRecord {
    let record_type = record.get("type").and_then(Value::as_str).unwrap_or("");

    if record_type == "system" {
        if record.get("subtype").and_then(Value::as_str) == Some("compact_boundary") {
            if let Some(parent) = record.get("logicalParentUuid").and_then(Value::as_str) {
                state.pending_continuation = Some(parent.to_string());
            }
        }
        return ClassifiedRecord::default();
    }

    if record_type == "user" {
        return classify_user_record(record, path, project, state);
    }

    if record_type == "assistant" {
        return classify_assistant_record(record, path, project);
    }

    ClassifiedRecord::default()
}

fn classify_user_record(
    record: &Value,
    path: &Path,
    project: &Project,
    state: &mut ClassifierState,
) -> ClassifiedRecord {
    let is_compact_summary = record
        .get("isCompactSummary")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let visible_only = record
        .get("isVisibleInTranscriptOnly")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let logical_parent = record
        .get("logicalParentUuid")
        .and_then(Value::as_str)
        .map(str::to_string);

    if is_compact_summary || (visible_only && logical_parent.is_some()) {
        return ClassifiedRecord::default();
    }

    let content = record.get("message").and_then(|m| m.get("content"));

    // List-shaped content is stringified Python-`str()`-style and run back
    // through the same synthetic-content check a plain string would get
    // (below); since every real content block carries a `type` key, that
    // recheck is what drops ordinary multi-block user turns.
    let text_content = match content {
        Some(Value::String(s)) => s.clone(),
        Some(array @ Value::Array(blocks)) => {
            if blocks.is_empty() {
                return ClassifiedRecord::default();
            }
            if let Some(first) = blocks.first() {
                if first.get("type").and_then(Value::as_str) == Some("tool_result") {
                    return ClassifiedRecord::default();
                }
            }
            python_repr(array)
        }
        _ => String::new(),
    };

    if text_content.is_empty() {
        return ClassifiedRecord::default();
    }
    if text_content.starts_with(CONTINUATION_PREFIX) {
        return ClassifiedRecord::default();
    }
    if is_synthetic_user_content(&text_content) {
        return ClassifiedRecord::default();
    }

    let timestamp = parse_timestamp(record).unwrap_or_else(Utc::now);
    let session_id = record
        .get("sessionId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let uuid = record.get("uuid").and_then(Value::as_str).map(str::to_string);

    let continued_from_uuid = state.pending_continuation.take();
    let is_continuation_session = continued_from_uuid.is_some();

    let message = Message {
        timestamp,
        role: MessageRole::User,
        content: text_content,
        session_id,
        uuid,
        filename: path.to_path_buf(),
        project: project.clone(),
        continued_from_uuid,
        parent_session_id: None,
        is_continuation_session,
    };

    ClassifiedRecord {
        message: Some(message),
        usage: None,
    }
}

fn classify_assistant_record(record: &Value, path: &Path, project: &Project) -> ClassifiedRecord {
    let timestamp = parse_timestamp(record).unwrap_or_else(Utc::now);
    let usage = extract_usage(record, timestamp);

    let content = record.get("message").and_then(|m| m.get("content"));
    let message = content.and_then(first_content_block).and_then(|first| {
        if first.get("type").and_then(Value::as_str) == Some("tool_use") {
            return None;
        }
        if first.get("type").and_then(Value::as_str) != Some("text") {
            return None;
        }
        let text = first.get("text").and_then(Value::as_str)?;
        if text.is_empty() {
            return None;
        }
        let session_id = record
            .get("sessionId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let uuid = record.get("uuid").and_then(Value::as_str).map(str::to_string);
        Some(Message {
            timestamp,
            role: MessageRole::Assistant,
            content: text.to_string(),
            session_id,
            uuid,
            filename: path.to_path_buf(),
            project: project.clone(),
            continued_from_uuid: None,
            parent_session_id: None,
            is_continuation_session: false,
        })
    });

    ClassifiedRecord { message, usage }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_project() -> Project {
        Project {
            id: "-tmp-proj".to_string(),
            display_name: "-tmp-proj".to_string(),
            path: "/tmp/proj".into(),
        }
    }

    #[test]
    fn drops_tool_result_user_record() {
        let record = json!({
            "type": "user",
            "timestamp": "2026-01-01T00:00:00Z",
            "message": {"content": [{"type": "tool_result", "content": "..."}]},
        });
        let mut state = ClassifierState::new();
        let out = classify_record(&record, Path::new("f.jsonl"), &test_project(), &mut state);
        assert!(out.message.is_none());
    }

    #[test]
    fn drops_synthetic_reminder_user_record() {
        let record = json!({
            "type": "user",
            "timestamp": "2026-01-01T00:00:00Z",
            "message": {"content": "<system-reminder>stuff</system-reminder>"},
        });
        let mut state = ClassifierState::new();
        let out = classify_record(&record, Path::new("f.jsonl"), &test_project(), &mut state);
        assert!(out.message.is_none());
    }

    #[test]
    fn keeps_plain_user_message() {
        let record = json!({
            "type": "user",
            "timestamp": "2026-01-01T00:00:00Z",
            "sessionId": "s1",
            "message": {"content": "hello there"},
        });
        let mut state = ClassifierState::new();
        let out = classify_record(&record, Path::new("f.jsonl"), &test_project(), &mut state);
        let msg = out.message.expect("expected a message");
        assert_eq!(msg.content, "hello there");
        assert_eq!(msg.role, MessageRole::User);
    }

    #[test]
    fn drops_ordinary_multi_block_user_turn_as_synthetic() {
        // List-shaped content is stringified and re-checked against the
        // synthetic-content markers; every real content block carries a
        // `type` key, so the stringified form always starts with
        // `[{'type':` and gets dropped here.
        let record = json!({
            "type": "user",
            "timestamp": "2026-01-01T00:00:00Z",
            "sessionId": "s1",
            "message": {"content": [{"type": "text", "text": "hello there"}]},
        });
        let mut state = ClassifierState::new();
        let out = classify_record(&record, Path::new("f.jsonl"), &test_project(), &mut state);
        assert!(out.message.is_none());
    }

    #[test]
    fn drops_tool_use_assistant_record_but_keeps_usage() {
        let record = json!({
            "type": "assistant",
            "timestamp": "2026-01-01T00:00:00Z",
            "message": {
                "content": [{"type": "tool_use", "name": "x"}],
                "usage": {"input_tokens": 10, "output_tokens": 20},
                "model": "claude-sonnet-4",
            },
        });
        let out = classify_assistant_record(&record, Path::new("f.jsonl"), &test_project());
        assert!(out.message.is_none());
        let usage = out.usage.expect("expected a usage sample");
        assert_eq!(usage.total_tokens(), 30);
    }

    #[test]
    fn compact_boundary_tags_next_user_message() {
        let boundary = json!({
            "type": "system",
            "subtype": "compact_boundary",
            "logicalParentUuid": "parent-uuid",
        });
        let mut state = ClassifierState::new();
        let out = classify_record(&boundary, Path::new("f.jsonl"), &test_project(), &mut state);
        assert!(out.message.is_none());

        let user_record = json!({
            "type": "user",
            "timestamp": "2026-01-01T00:00:00Z",
            "sessionId": "s2",
            "message": {"content": "continuing on"},
        });
        let out = classify_record(&user_record, Path::new("f.jsonl"), &test_project(), &mut state);
        let msg = out.message.expect("expected a message");
        assert_eq!(msg.continued_from_uuid.as_deref(), Some("parent-uuid"));
        assert!(msg.is_continuation_session);
    }
}
