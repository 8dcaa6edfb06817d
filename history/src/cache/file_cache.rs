//! Per-file cache keyed by `(path, mtime, size)`, with single-flight
//! deduplication of concurrent populators for the same path.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::Mutex;
use tokio::sync::Notify;
use tokio::sync::RwLock;

use crate::file_reader::ParsedFile;
use crate::file_reader::read_file;
use crate::types::Message;
use crate::types::Project;
use crate::types::UsageSample;

#[derive(Debug, Clone)]
pub struct FileCacheEntry {
    pub mtime: SystemTime,
    pub size: u64,
    pub messages: Vec<Message>,
    pub usage: Vec<UsageSample>,
}

/// Single-flight, unbounded memoization of parsed JSONL files.
///
/// Unbounded is deliberate: eviction comes from invalidation (stale
/// `mtime`/`size`) or process restart, never from an LRU policy.
#[derive(Default)]
pub struct FileCache {
    entries: RwLock<HashMap<PathBuf, FileCacheEntry>>,
    in_flight: Mutex<HashMap<PathBuf, Arc<Notify>>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the (possibly cached) parsed contents of `path`.
    ///
    /// On an I/O error the file is treated as unreadable: logs and returns
    /// an empty parse, matching the "unreadable file → error + empty"
    /// taxonomy entry rather than failing the caller.
    pub async fn get(&self, path: &Path, project: &Project) -> ParsedFile {
        let meta = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "unreadable file");
                return ParsedFile::default();
            }
        };
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let size = meta.len();

        if let Some(entry) = self.entries.read().await.get(path) {
            if entry.mtime == mtime && entry.size == size {
                return ParsedFile {
                    messages: entry.messages.clone(),
                    usage: entry.usage.clone(),
                };
            }
        }

        self.populate(path, project, mtime, size).await
    }

    pub async fn invalidate(&self, path: &Path) {
        self.entries.write().await.remove(path);
    }

    async fn populate(
        &self,
        path: &Path,
        project: &Project,
        mtime: SystemTime,
        size: u64,
    ) -> ParsedFile {
        let notify = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.get(path) {
                Some(existing.clone())
            } else {
                in_flight.insert(path.to_path_buf(), Arc::new(Notify::new()));
                None
            }
        };

        if let Some(notify) = notify {
            notify.notified().await;
            if let Some(entry) = self.entries.read().await.get(path) {
                if entry.mtime == mtime && entry.size == size {
                    return ParsedFile {
                        messages: entry.messages.clone(),
                        usage: entry.usage.clone(),
                    };
                }
            }
            // The winner's result went stale again (file kept changing);
            // fall through and race to parse it ourselves.
        }

        let parsed = match read_file(path, project).await {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "unreadable file");
                ParsedFile::default()
            }
        };

        self.entries.write().await.insert(
            path.to_path_buf(),
            FileCacheEntry {
                mtime,
                size,
                messages: parsed.messages.clone(),
                usage: parsed.usage.clone(),
            },
        );

        if let Some(notify) = self.in_flight.lock().await.remove(path) {
            notify.notify_waiters();
        }

        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
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
    async fn caches_until_mtime_or_size_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jsonl");
        {
            let mut f = tokio::fs::File::create(&path).await.unwrap();
            f.write_all(br#"{"type":"user","timestamp":"2026-01-01T00:00:00Z","sessionId":"s","message":{"content":"one"}}"#).await.unwrap();
            f.flush().await.unwrap();
        }

        let cache = FileCache::new();
        let project = test_project(dir.path());
        let first = cache.get(&path, &project).await;
        assert_eq!(first.messages.len(), 1);

        // Append without cache invalidation should still serve a fresh read
        // since stat-based detection notices the mtime/size change.
        {
            let mut f = tokio::fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .await
                .unwrap();
            f.write_all(b"\n").await.unwrap();
            f.write_all(br#"{"type":"user","timestamp":"2026-01-01T00:00:01Z","sessionId":"s","message":{"content":"two"}}"#).await.unwrap();
            f.flush().await.unwrap();
        }

        let second = cache.get(&path, &project).await;
        assert_eq!(second.messages.len(), 2);
    }

    #[tokio::test]
    async fn single_flight_deduplicates_concurrent_populators() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jsonl");
        {
            let mut f = tokio::fs::File::create(&path).await.unwrap();
            f.write_all(br#"{"type":"user","timestamp":"2026-01-01T00:00:00Z","sessionId":"s","message":{"content":"one"}}"#).await.unwrap();
            f.flush().await.unwrap();
        }

        let cache = Arc::new(FileCache::new());
        let project = test_project(dir.path());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let path = path.clone();
            let project = project.clone();
            handles.push(tokio::spawn(async move { cache.get(&path, &project).await }));
        }
        for handle in handles {
            let parsed = handle.await.unwrap();
            assert_eq!(parsed.messages.len(), 1);
        }
    }
}
