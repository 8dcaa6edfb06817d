//! Whole-file JSONL parsing: read one file end to end, classify every
//! line, and return the resulting messages and usage samples.
//!
//! This is the non-streaming counterpart to `lazy_reader`; the file cache
//! (`cache::file_cache`) calls this to populate a cache entry in one pass.

use std::path::Path;

use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;

use crate::classify::ClassifierState;
use crate::classify::classify_record;
use crate::types::Message;
use crate::types::Project;
use crate::types::UsageSample;

#[derive(Debug, Default, Clone)]
pub struct ParsedFile {
    pub messages: Vec<Message>,
    pub usage: Vec<UsageSample>,
}

/// Parse `path` fully, skipping blank lines and logging malformed ones.
///
/// Returns an empty `ParsedFile` (rather than an error) on open/read
/// failure; the caller is responsible for logging that as an unreadable
/// file per the error taxonomy.
pub async fn read_file(path: &Path, project: &Project) -> std::io::Result<ParsedFile> {
    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut out = ParsedFile::default();
    let mut state = ClassifierState::new();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(path = %path.display(), line = line_no, error = %err, "malformed JSONL record, skipping");
                continue;
            }
        };
        let classified = classify_record(&value, path, project, &mut state);
        if let Some(message) = classified.message {
            out.messages.push(message);
        }
        if let Some(usage) = classified.usage {
            out.usage.push(usage);
        }
    }

    out.messages.sort_by_key(|m| m.timestamp);
    Ok(out)
}
