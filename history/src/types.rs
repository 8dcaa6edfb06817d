//! Core domain types: raw records, normalized messages, usage samples,
//! thread groups, and project identity.

use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Identity of a project directory under the configured root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Project {
    /// Hyphen-encoded transformation of the source path (see `path_to_project_id`).
    pub id: String,
    /// Defaults to `id` verbatim; callers wanting a friendlier heuristic
    /// supply their own naming function (see `service::HistoryService`).
    pub display_name: String,
    /// Absolute path of the project's corpus directory.
    pub path: PathBuf,
}

/// Transform an absolute source path into its project id.
///
/// Idempotent: strip a leading `/` or `-` (an already-encoded id has
/// neither of the former, only the latter), replace every `/`, `.`, `_`
/// with `-`, then prepend a single `-`. Stripping the leading `-` too is
/// what makes re-encoding an already-encoded id a true no-op rather than
/// accumulating a dash on every reapplication.
pub fn path_to_project_id(path: &str) -> String {
    let stripped = path.strip_prefix(['/', '-']).unwrap_or(path);
    let mut id = String::with_capacity(stripped.len() + 1);
    id.push('-');
    for c in stripped.chars() {
        match c {
            '/' | '.' | '_' => id.push('-'),
            other => id.push(other),
        }
    }
    id
}

/// Role of a normalized conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A normalized, immutable conversation message.
///
/// Produced once by the classifier (`classify::classify_record`) and never
/// mutated afterward; search annotations are carried alongside in
/// `AnnotatedMessage`, not written back into this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
    pub session_id: String,
    pub uuid: Option<String>,
    pub filename: PathBuf,
    pub project: Project,
    pub continued_from_uuid: Option<String>,
    pub parent_session_id: Option<String>,
    pub is_continuation_session: bool,
}

/// A search-match annotation carried alongside a `Message` in responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchAnnotation {
    pub is_search_match: bool,
    pub search_keyword: Option<String>,
}

/// A `Message` paired with its (response-local) search annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedMessage {
    pub message: Message,
    pub annotation: SearchAnnotation,
}

impl AnnotatedMessage {
    pub fn unannotated(message: Message) -> Self {
        Self {
            message,
            annotation: SearchAnnotation::default(),
        }
    }
}

/// A thread group: one user turn plus its trailing assistant turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadGroup {
    pub messages: Vec<AnnotatedMessage>,
}

impl ThreadGroup {
    /// Representative timestamp: the timestamp of the first (user) message.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.messages.first().map(|m| m.message.timestamp)
    }
}

/// A single token-usage sample extracted from an assistant record's
/// `message.usage` object, independent of whether that record also
/// produced a `Message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSample {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl UsageSample {
    /// Tokens counted against subscription limits: input + output only.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
