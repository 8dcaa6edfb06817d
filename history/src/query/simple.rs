//! Simpler, non-streaming coordinator: loads whole projects from the
//! project cache, then filters/groups/paginates in memory. Must agree
//! bit-exact with `StreamingCoordinator` for the same inputs, trading
//! early-termination savings for implementation simplicity.

use chrono_tz::Tz;

use crate::cache::FileCache;
use crate::cache::ProjectCache;
use crate::filters::DateFilter;
use crate::filters::KeywordFilter;
use crate::grouper::apply_keyword_annotations;
use crate::grouper::apply_sort_order;
use crate::grouper::group_ascending;
use crate::query::QueryRequest;
use crate::query::QueryResponse;
use crate::query::build_stats;
use crate::types::Message;
use crate::types::Project;

pub struct SimpleCoordinator {
    timezone: Tz,
}

impl SimpleCoordinator {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub async fn get_conversations(
        &self,
        projects: &[Project],
        request: &QueryRequest,
        file_cache: &FileCache,
        project_cache: &ProjectCache,
    ) -> QueryResponse {
        let date_filter = DateFilter {
            start_date: request.start_date,
            end_date: request.end_date,
            timezone: self.timezone,
        };
        let keyword_filter = KeywordFilter {
            keyword: request.keyword.clone(),
            show_related_threads: request.show_related_threads,
        };

        let mut messages: Vec<Message> = Vec::new();
        for project in projects {
            let entry = project_cache.get(project, file_cache).await;
            messages.extend(entry.messages);
        }
        messages.sort_by_key(|m| m.timestamp);

        let filtered: Vec<Message> = messages
            .into_iter()
            .filter(|m| date_filter.matches(m))
            .filter(|m| keyword_filter.admits(m))
            .collect();

        let total_messages = filtered.len();
        let groups = group_ascending(&filtered);
        let (mut groups, search_match_count) = apply_keyword_annotations(groups, &keyword_filter);
        let total_threads = groups.len();
        groups = apply_sort_order(groups, request.sort_order);

        let stats = build_stats(&groups, self.timezone);

        let page: Vec<_> = groups
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();
        let actual_messages = page.iter().map(|g| g.messages.len()).sum();

        QueryResponse {
            actual_threads: page.len(),
            actual_messages,
            conversations: page,
            total_threads,
            total_messages,
            offset: request.offset,
            limit: request.limit,
            search_match_count,
            stats,
        }
    }
}
