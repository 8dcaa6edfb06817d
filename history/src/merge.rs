//! Lazy k-way merge across open file readers, producing a single
//! globally timestamp-ordered stream of messages.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::DateTime;
use chrono::Utc;

use crate::lazy_reader::LazyFileReader;
use crate::types::Message;

/// Heap entry: ties are broken lexicographically on `(project_id,
/// file_path)` so merge order is deterministic across runs, not just
/// across ties within a single run.
#[derive(Debug, Clone, Eq, PartialEq)]
struct HeapEntry {
    timestamp: DateTime<Utc>,
    project_id: String,
    file_path: String,
    reader_index: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse the natural ordering so the
        // smallest (timestamp, project_id, file_path) sorts to the top.
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.project_id.cmp(&self.project_id))
            .then_with(|| other.file_path.cmp(&self.file_path))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Merges many lazy per-file readers into one ascending-timestamp stream.
pub struct MergingPriorityQueue {
    readers: Vec<LazyFileReader>,
    heap: BinaryHeap<HeapEntry>,
}

impl MergingPriorityQueue {
    /// Build the queue and prime the heap with each reader's first
    /// message (readers that are already empty contribute nothing).
    pub async fn new(readers: Vec<LazyFileReader>) -> std::io::Result<Self> {
        let mut queue = Self {
            readers,
            heap: BinaryHeap::new(),
        };
        for index in 0..queue.readers.len() {
            queue.push_head(index).await?;
        }
        Ok(queue)
    }

    async fn push_head(&mut self, reader_index: usize) -> std::io::Result<()> {
        let reader = &mut self.readers[reader_index];
        if let Some(message) = reader.peek().await?.cloned() {
            self.heap.push(HeapEntry {
                timestamp: message.timestamp,
                project_id: message.project.id.clone(),
                file_path: reader.path().display().to_string(),
                reader_index,
            });
        }
        Ok(())
    }

    /// Pop and return the next message in global ascending order, or
    /// `None` once every reader is exhausted.
    pub async fn next_message(&mut self) -> std::io::Result<Option<Message>> {
        let Some(entry) = self.heap.pop() else {
            return Ok(None);
        };
        let reader_index = entry.reader_index;
        let message = self.readers[reader_index].next().await?;
        self.push_head(reader_index).await?;
        Ok(message)
    }

    /// Return up to `limit` messages in ascending order.
    pub async fn batch(&mut self, limit: usize) -> std::io::Result<Vec<Message>> {
        let mut out = Vec::with_capacity(limit);
        while out.len() < limit {
            match self.next_message().await? {
                Some(message) => out.push(message),
                None => break,
            }
        }
        Ok(out)
    }

    /// Re-seek every reader to `timestamp` and rebuild the heap.
    pub async fn seek_all(&mut self, timestamp: DateTime<Utc>) -> std::io::Result<()> {
        self.heap.clear();
        for index in 0..self.readers.len() {
            self.readers[index].seek(timestamp).await?;
            self.push_head(index).await?;
        }
        Ok(())
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Project;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    fn test_project(id: &str) -> Project {
        Project {
            id: id.to_string(),
            display_name: id.to_string(),
            path: "/tmp".into(),
        }
    }

    async fn write_file(path: &std::path::Path, entries: &[(&str, &str)]) {
        let mut f = tokio::fs::File::create(path).await.unwrap();
        for (ts, content) in entries {
            let line = format!(
                r#"{{"type":"user","timestamp":"{ts}","sessionId":"s","message":{{"content":"{content}"}}}}"#
            );
            f.write_all(line.as_bytes()).await.unwrap();
            f.write_all(b"\n").await.unwrap();
        }
        f.flush().await.unwrap();
    }

    #[tokio::test]
    async fn merges_two_files_in_global_timestamp_order() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("b.jsonl");
        write_file(
            &a,
            &[
                ("2026-01-01T00:00:00Z", "a1"),
                ("2026-01-01T00:02:00Z", "a2"),
            ],
        )
        .await;
        write_file(&b, &[("2026-01-01T00:01:00Z", "b1")]).await;

        let readers = vec![
            LazyFileReader::new(a, test_project("proj-a")),
            LazyFileReader::new(b, test_project("proj-b")),
        ];
        let mut queue = MergingPriorityQueue::new(readers).await.unwrap();
        let messages = queue.batch(10).await.unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a1", "b1", "a2"]);
    }

    #[tokio::test]
    async fn ties_break_on_project_id_then_file_path() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("b.jsonl");
        write_file(&a, &[("2026-01-01T00:00:00Z", "from-b-project")]).await;
        write_file(&b, &[("2026-01-01T00:00:00Z", "from-a-project")]).await;

        // Reader for `a` is tagged with project id "proj-z" and reader for
        // `b` with "proj-a" -- the lexicographically smaller project id
        // must come first despite identical timestamps.
        let readers = vec![
            LazyFileReader::new(a, test_project("proj-z")),
            LazyFileReader::new(b, test_project("proj-a")),
        ];
        let mut queue = MergingPriorityQueue::new(readers).await.unwrap();
        let messages = queue.batch(10).await.unwrap();
        assert_eq!(messages[0].content, "from-a-project");
    }
}
