//! Per-file and per-project memoization of the parsed corpus.

mod file_cache;
mod project_cache;

pub use file_cache::FileCache;
pub use file_cache::FileCacheEntry;
pub use project_cache::ProjectCache;
pub use project_cache::ProjectCacheEntry;
