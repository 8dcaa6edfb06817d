//! Per-project cache keyed by the maximum file mtime observed in the
//! project directory, with session-continuation linking across files.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use futures::StreamExt;
use futures::stream;
use tokio::sync::RwLock;

use crate::cache::file_cache::FileCache;
use crate::types::Message;
use crate::types::Project;
use crate::types::UsageSample;

#[derive(Debug, Clone)]
pub struct ProjectCacheEntry {
    pub max_mtime: SystemTime,
    pub messages: Vec<Message>,
    pub usage: Vec<UsageSample>,
}

#[derive(Default)]
pub struct ProjectCache {
    entries: RwLock<HashMap<PathBuf, ProjectCacheEntry>>,
}

async fn list_jsonl_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut reader = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            out.push(path);
        }
    }
    Ok(out)
}

async fn max_mtime(files: &[PathBuf]) -> SystemTime {
    let mut max = SystemTime::UNIX_EPOCH;
    for file in files {
        if let Ok(meta) = tokio::fs::metadata(file).await {
            if let Ok(mtime) = meta.modified() {
                if mtime > max {
                    max = mtime;
                }
            }
        }
    }
    max
}

/// Resolve `continued_from_uuid` links into `parent_session_id` using a
/// `uuid -> session_id` map built from every message in the project.
fn link_continuations(messages: &mut [Message]) {
    let uuid_to_session: HashMap<String, String> = messages
        .iter()
        .filter_map(|m| m.uuid.as_ref().map(|u| (u.clone(), m.session_id.clone())))
        .collect();

    for message in messages.iter_mut() {
        if let Some(parent_uuid) = &message.continued_from_uuid {
            if let Some(session) = uuid_to_session.get(parent_uuid) {
                message.parent_session_id = Some(session.clone());
            }
        }
    }
}

impl ProjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn invalidate(&self, project_dir: &Path) {
        self.entries.write().await.remove(project_dir);
    }

    /// Return the linked, concatenated message/usage lists for `project`.
    pub async fn get(&self, project: &Project, file_cache: &FileCache) -> ProjectCacheEntry {
        let files = match list_jsonl_files(&project.path).await {
            Ok(files) => files,
            Err(err) => {
                tracing::error!(path = %project.path.display(), error = %err, "unreadable project directory");
                return ProjectCacheEntry {
                    max_mtime: SystemTime::UNIX_EPOCH,
                    messages: Vec::new(),
                    usage: Vec::new(),
                };
            }
        };
        let current_max = max_mtime(&files).await;

        if let Some(entry) = self.entries.read().await.get(&project.path) {
            if entry.max_mtime >= current_max {
                return entry.clone();
            }
        }

        self.rebuild(project, &files, current_max, file_cache).await
    }

    async fn rebuild(
        &self,
        project: &Project,
        files: &[PathBuf],
        max_mtime: SystemTime,
        file_cache: &FileCache,
    ) -> ProjectCacheEntry {
        let permits = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        // Bounded fan-out: at most `permits` files are being parsed
        // concurrently at any moment, per the concurrency model's
        // "I/O-bound parsing runs in parallel with bounded fan-out" rule.
        let parsed_files: Vec<_> = stream::iter(files.iter().cloned())
            .map(|file| {
                let project = project.clone();
                async move { file_cache.get(&file, &project).await }
            })
            .buffer_unordered(permits)
            .collect()
            .await;

        let mut messages: Vec<Message> = Vec::new();
        let mut usage: Vec<UsageSample> = Vec::new();
        for parsed in parsed_files {
            messages.extend(parsed.messages);
            usage.extend(parsed.usage);
        }

        link_continuations(&mut messages);
        messages.sort_by_key(|m| m.timestamp);
        usage.sort_by_key(|u| u.timestamp);

        let entry = ProjectCacheEntry {
            max_mtime,
            messages,
            usage,
        };
        self.entries
            .write()
            .await
            .insert(project.path.clone(), entry.clone());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    fn test_project(dir: &Path) -> Project {
        Project {
            id: "-tmp-proj".to_string(),
            display_name: "-tmp-proj".to_string(),
            path: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn links_continuation_sessions_across_files() {
        let dir = tempdir().unwrap();
        let project = test_project(dir.path());

        let file_a = dir.path().join("a.jsonl");
        let mut f = tokio::fs::File::create(&file_a).await.unwrap();
        f.write_all(br#"{"type":"user","timestamp":"2026-01-01T00:00:00Z","sessionId":"session-a","uuid":"u1","message":{"content":"first"}}"#).await.unwrap();
        f.flush().await.unwrap();

        let file_b = dir.path().join("b.jsonl");
        let mut f = tokio::fs::File::create(&file_b).await.unwrap();
        f.write_all(br#"{"type":"system","subtype":"compact_boundary","logicalParentUuid":"u1"}"#).await.unwrap();
        f.write_all(b"\n").await.unwrap();
        f.write_all(br#"{"type":"user","timestamp":"2026-01-01T01:00:00Z","sessionId":"session-b","uuid":"u2","message":{"content":"continued"}}"#).await.unwrap();
        f.flush().await.unwrap();

        let file_cache = FileCache::new();
        let project_cache = ProjectCache::new();
        let entry = project_cache.get(&project, &file_cache).await;

        assert_eq!(entry.messages.len(), 2);
        let continued = entry
            .messages
            .iter()
            .find(|m| m.session_id == "session-b")
            .expect("expected continued message");
        assert_eq!(continued.parent_session_id.as_deref(), Some("session-a"));
    }

    #[tokio::test]
    async fn missing_directory_yields_empty_entry() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let project = test_project(&missing);
        let file_cache = FileCache::new();
        let project_cache = ProjectCache::new();
        let entry = project_cache.get(&project, &file_cache).await;
        assert!(entry.messages.is_empty());
    }
}
