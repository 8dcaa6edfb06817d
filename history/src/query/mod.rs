//! Query coordinator: paginated, filtered, thread-grouped conversation
//! retrieval, with both a streaming (early-terminating) and a simpler
//! in-memory implementation that must agree bit-exact.

mod coordinator;
mod simple;

pub use coordinator::StreamingCoordinator;
pub use simple::SimpleCoordinator;

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::HistoryError;
use crate::error::Result;
use crate::grouper::SortOrder;
use crate::types::ThreadGroup;

/// Parameters for `get_conversations`.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub projects: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub keyword: Option<String>,
    pub show_related_threads: bool,
    pub sort_order: SortOrder,
    pub offset: usize,
    pub limit: usize,
}

/// Default `limit`, matching the documented external-interface default.
pub const DEFAULT_LIMIT: usize = 15;

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            start_date: None,
            end_date: None,
            keyword: None,
            show_related_threads: true,
            sort_order: SortOrder::default(),
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl QueryRequest {
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 || self.limit > 1000 {
            return Err(HistoryError::InvalidQuery {
                field: "limit",
                reason: format!("must be in [1, 1000], got {}", self.limit),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryStats {
    pub total_threads: usize,
    pub total_messages: usize,
    pub project_count_in_results: usize,
    pub daily_thread_counts: BTreeMap<NaiveDate, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    pub conversations: Vec<ThreadGroup>,
    pub total_threads: usize,
    pub total_messages: usize,
    pub actual_threads: usize,
    pub actual_messages: usize,
    pub offset: usize,
    pub limit: usize,
    pub search_match_count: usize,
    pub stats: QueryStats,
}

pub(crate) fn build_stats(groups: &[ThreadGroup], timezone: chrono_tz::Tz) -> QueryStats {
    use chrono::TimeZone;
    use std::collections::HashSet;

    let mut daily_thread_counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    let mut projects: HashSet<String> = HashSet::new();
    let mut total_messages = 0usize;

    for group in groups {
        total_messages += group.messages.len();
        if let Some(first) = group.messages.first() {
            projects.insert(first.message.project.id.clone());
            let local_date = timezone
                .from_utc_datetime(&first.message.timestamp.naive_utc())
                .date_naive();
            *daily_thread_counts.entry(local_date).or_insert(0) += 1;
        }
    }

    QueryStats {
        total_threads: groups.len(),
        total_messages,
        project_count_in_results: projects.len(),
        daily_thread_counts,
    }
}
