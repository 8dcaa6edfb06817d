//! Watcher adapter: debounce/coalesce, longest-prefix project resolution,
//! cache invalidation, and fan-out publish.
//!
//! The raw OS-level file-watching daemon (recursive directory
//! subscription, `notify`/`watchdog`-equivalent event sourcing) is out of
//! scope -- this adapter only receives already-detected
//! `(absolute_path, kind)` pairs. The debounce map is modeled after the
//! workspace's `indexing::event_queue::EventQueue` key-based
//! deduplication, generalized from per-path keys to per-project
//! coalescing with a timed flush instead of pull-based draining.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::broadcast::BroadcastEvent;
use crate::broadcast::Broadcaster;
use crate::cache::ProjectCache;
use crate::types::Project;

const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Modified,
}

/// Merge strategy for events coalesced within one debounce window: the
/// latest event kind wins, but the window's start time (`first_seen`) is
/// preserved so the flush fires on a fixed cadence from the first event.
fn merge_event_kind(_existing: WatchEventKind, new: WatchEventKind) -> WatchEventKind {
    new
}

struct PendingWindow {
    kind: WatchEventKind,
    file_path: PathBuf,
    first_seen: Instant,
}

/// Longest-prefix match: the owning project is the one whose directory is
/// the longest path prefix of `absolute_path`.
pub fn resolve_project<'a>(absolute_path: &Path, projects: &'a [Project]) -> Option<&'a Project> {
    projects
        .iter()
        .filter(|p| absolute_path.starts_with(&p.path))
        .max_by_key(|p| p.path.as_os_str().len())
}

/// Receives `(path, kind)` events, debounces per project, invalidates the
/// project cache, and publishes a `file_change` message once per window.
pub struct WatcherAdapter<B: Broadcaster> {
    projects: RwLock<Vec<Project>>,
    pending: Arc<RwLock<HashMap<String, PendingWindow>>>,
    project_cache: Arc<ProjectCache>,
    broadcaster: Arc<B>,
}

impl<B: Broadcaster + 'static> WatcherAdapter<B> {
    pub fn new(projects: Vec<Project>, project_cache: Arc<ProjectCache>, broadcaster: Arc<B>) -> Self {
        Self {
            projects: RwLock::new(projects),
            pending: Arc::new(RwLock::new(HashMap::new())),
            project_cache,
            broadcaster,
        }
    }

    pub async fn set_projects(&self, projects: Vec<Project>) {
        *self.projects.write().await = projects;
    }

    /// Record a raw `(path, kind)` event. Schedules (or joins) the
    /// project's debounce window; the window's flush runs on a spawned
    /// task so `on_change` itself never blocks for 2 seconds.
    pub async fn on_change(&self, absolute_path: PathBuf, kind: WatchEventKind) {
        let project = {
            let projects = self.projects.read().await;
            match resolve_project(&absolute_path, &projects) {
                Some(p) => p.clone(),
                None => {
                    tracing::warn!(path = %absolute_path.display(), "file change outside any known project, ignoring");
                    return;
                }
            }
        };

        let mut spawn_flush = false;
        {
            let mut pending = self.pending.write().await;
            match pending.get_mut(&project.id) {
                Some(existing) => {
                    existing.kind = merge_event_kind(existing.kind, kind);
                    existing.file_path = absolute_path.clone();
                }
                None => {
                    pending.insert(
                        project.id.clone(),
                        PendingWindow {
                            kind,
                            file_path: absolute_path.clone(),
                            first_seen: Instant::now(),
                        },
                    );
                    spawn_flush = true;
                }
            }
        }

        if spawn_flush {
            let pending = self.pending.clone();
            let project_cache = self.project_cache.clone();
            let broadcaster = self.broadcaster.clone();
            let project = project.clone();
            tokio::spawn(async move {
                tokio::time::sleep(DEBOUNCE_WINDOW).await;
                let window = pending.write().await.remove(&project.id);
                let Some(window) = window else { return };

                project_cache.invalidate(&project.path).await;

                let event = BroadcastEvent {
                    event: window.kind,
                    file_path: window.file_path,
                    project_id: project.id.clone(),
                    timestamp: Utc::now(),
                };
                broadcaster.publish(event).await;
            });
        }
    }

    pub fn elapsed_since_first_seen(&self, first_seen: Instant) -> Duration {
        first_seen.elapsed()
    }
}
