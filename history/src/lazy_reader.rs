//! Lazy, buffered, single-file reader for the streaming query path.
//!
//! Unlike `file_reader::read_file` (which parses a whole file in one
//! shot for the cache), this reader holds the file open and yields one
//! classified message at a time with a small lookahead buffer, so the
//! merging priority queue (`merge`) can pull records on demand instead of
//! loading every file into memory up front.

use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::io::Lines;

use crate::classify::ClassifierState;
use crate::classify::classify_record;
use crate::types::Message;
use crate::types::Project;

const DEFAULT_BUFFER_SIZE: usize = 10;

/// A single-file streaming reader with a bounded lookahead buffer.
///
/// Owns the file descriptor for as long as it is alive; dropping it (or
/// calling `close`) releases the descriptor. `peek`/`next` never return a
/// `UsageSample` — usage accounting reads the whole corpus separately via
/// the project cache, since it needs every sample regardless of query
/// filters.
pub struct LazyFileReader {
    path: PathBuf,
    project: Project,
    lines: Option<Lines<BufReader<tokio::fs::File>>>,
    classifier: ClassifierState,
    buffer: VecDeque<Message>,
    buffer_size: usize,
    eof: bool,
}

impl LazyFileReader {
    /// Open `path` lazily: the file descriptor is acquired on the first
    /// `peek`/`next` call, not at construction.
    pub fn new(path: PathBuf, project: Project) -> Self {
        Self {
            path,
            project,
            lines: None,
            classifier: ClassifierState::new(),
            buffer: VecDeque::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            eof: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_open(&mut self) -> std::io::Result<()> {
        if self.lines.is_none() && !self.eof {
            let file = tokio::fs::File::open(&self.path).await?;
            self.lines = Some(BufReader::new(file).lines());
        }
        Ok(())
    }

    async fn fill_buffer(&mut self) -> std::io::Result<()> {
        self.ensure_open().await?;
        while self.buffer.len() < self.buffer_size && !self.eof {
            let Some(lines) = self.lines.as_mut() else {
                break;
            };
            match lines.next_line().await? {
                Some(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let value: serde_json::Value = match serde_json::from_str(trimmed) {
                        Ok(v) => v,
                        Err(err) => {
                            tracing::warn!(path = %self.path.display(), error = %err, "malformed JSONL record, skipping");
                            continue;
                        }
                    };
                    let classified =
                        classify_record(&value, &self.path, &self.project, &mut self.classifier);
                    if let Some(message) = classified.message {
                        self.buffer.push_back(message);
                    }
                }
                None => {
                    self.eof = true;
                }
            }
        }
        Ok(())
    }

    /// Look at, without consuming, the next message.
    pub async fn peek(&mut self) -> std::io::Result<Option<&Message>> {
        if self.buffer.is_empty() && !self.eof {
            self.fill_buffer().await?;
        }
        Ok(self.buffer.front())
    }

    /// Consume and return the next message.
    pub async fn next(&mut self) -> std::io::Result<Option<Message>> {
        if self.buffer.is_empty() && !self.eof {
            self.fill_buffer().await?;
        }
        Ok(self.buffer.pop_front())
    }

    /// Advance past every message older than `timestamp`. Implemented as a
    /// linear scan via repeated `peek`/`next`, which is acceptable since
    /// seeks are rare relative to sequential reads.
    pub async fn seek(&mut self, timestamp: DateTime<Utc>) -> std::io::Result<()> {
        self.close();
        loop {
            match self.peek().await? {
                Some(message) if message.timestamp < timestamp => {
                    self.next().await?;
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Release the file descriptor and reset stream position to the
    /// start of the file (the next `peek`/`next` reopens it).
    pub fn close(&mut self) {
        self.lines = None;
        self.buffer.clear();
        self.classifier = ClassifierState::new();
        self.eof = false;
    }
}
