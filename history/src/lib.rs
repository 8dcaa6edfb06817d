//! cc-history: ingestion, streaming query, and usage-accounting core for
//! a local, append-only corpus of JSON-Lines coding-assistant conversation
//! logs.
//!
//! The crate is organized leaves-first, mirroring the dependency order of
//! the system it implements:
//!
//! - [`types`] -- the domain model: `Message`, `UsageSample`, `ThreadGroup`,
//!   `Project`.
//! - [`classify`] -- raw-record parsing and the content filters that turn a
//!   JSONL line into zero or one `Message` plus zero or one `UsageSample`.
//! - [`file_reader`] -- whole-file parsing for the cache's populate path.
//! - [`lazy_reader`] -- buffered, one-record-at-a-time parsing for the
//!   streaming query path.
//! - [`cache`] -- per-file and per-project memoization with single-flight
//!   deduplication and stat-based invalidation.
//! - [`merge`] -- the k-way merge across open lazy readers.
//! - [`filters`] -- date and keyword predicates applied during the merge.
//! - [`grouper`] -- thread grouping, keyword thread-inclusion, and
//!   early-termination bookkeeping.
//! - [`query`] -- the streaming and simple coordinators that compose the
//!   above into one paginated response.
//! - [`usage`] -- the session-block and rolling-weekly usage accounting
//!   engine.
//! - [`watcher`] -- the debounce/invalidate/publish adapter downstream of
//!   an external file-system watcher.
//! - [`broadcast`] -- the fan-out collaborator trait.
//! - [`service`] -- [`HistoryService`], the process-wide handle tying
//!   everything together.
//! - [`config`] -- environment-sourced configuration.
//! - [`error`] -- the caller-facing error taxonomy.
//! - [`logging`] -- `tracing` subscriber setup.

pub mod broadcast;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod file_reader;
pub mod filters;
pub mod grouper;
pub mod lazy_reader;
pub mod logging;
pub mod merge;
pub mod query;
pub mod service;
pub mod types;
pub mod usage;
pub mod watcher;

pub use config::HistoryConfig;
pub use error::HistoryError;
pub use error::Result;
pub use query::QueryRequest;
pub use query::QueryResponse;
pub use query::QueryStats;
pub use query::SimpleCoordinator;
pub use query::StreamingCoordinator;
pub use service::HistoryService;
pub use types::AnnotatedMessage;
pub use types::Message;
pub use types::MessageRole;
pub use types::Project;
pub use types::SearchAnnotation;
pub use types::ThreadGroup;
pub use types::UsageSample;
pub use types::path_to_project_id;
pub use usage::NullPlanLimits;
pub use usage::PlanLimits;
pub use usage::UsageEngine;
pub use usage::UsageReport;
