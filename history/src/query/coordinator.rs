//! Streaming query coordinator: merges per-file lazy readers, filters,
//! groups with early termination, and paginates.

use std::collections::HashMap;

use crate::filters::DateFilter;
use crate::filters::KeywordFilter;
use crate::grouper::EarlyTerminatingGrouper;
use crate::grouper::apply_keyword_annotations;
use crate::grouper::apply_sort_order;
use crate::grouper::group_ascending;
use crate::lazy_reader::LazyFileReader;
use crate::merge::MergingPriorityQueue;
use crate::query::QueryRequest;
use crate::query::QueryResponse;
use crate::query::build_stats;
use crate::types::Message;
use crate::types::MessageRole;
use crate::types::Project;
use chrono_tz::Tz;

/// Streaming coordinator. Holds no state between calls; each
/// `get_conversations` call opens its own readers and merger.
pub struct StreamingCoordinator {
    timezone: Tz,
}

impl StreamingCoordinator {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// `projects` is the already-resolved, allow-list-intersected set of
    /// projects to search, each with its `*.jsonl` file list.
    pub async fn get_conversations(
        &self,
        projects: &[(Project, Vec<std::path::PathBuf>)],
        request: &QueryRequest,
    ) -> std::io::Result<QueryResponse> {
        let mut readers = Vec::new();
        for (project, files) in projects {
            for file in files {
                readers.push(LazyFileReader::new(file.clone(), project.clone()));
            }
        }

        let date_filter = DateFilter {
            start_date: request.start_date,
            end_date: request.end_date,
            timezone: self.timezone,
        };
        let keyword_filter = KeywordFilter {
            keyword: request.keyword.clone(),
            show_related_threads: request.show_related_threads,
        };

        let mut merger = MergingPriorityQueue::new(readers).await?;
        let mut grouper = EarlyTerminatingGrouper::new(request.offset, request.limit);

        // Session continuity (spec §8 scenario 4): a `user` message that
        // falls outside the date filter is not dropped outright -- it's
        // held here keyed by session, in case the next same-session
        // `assistant` message lands in range and needs it as its anchor.
        // A fresh `user` message for that session (in range or not)
        // supersedes whatever anchor was pending.
        let mut pending_anchor: HashMap<String, Message> = HashMap::new();

        loop {
            let Some(message) = merger.next_message().await? else {
                break;
            };
            let date_ok = date_filter.matches(&message);

            if message.role == MessageRole::User {
                pending_anchor.remove(&message.session_id);
                if !date_ok {
                    pending_anchor.insert(message.session_id.clone(), message);
                    continue;
                }
            } else if date_ok {
                if let Some(anchor) = pending_anchor.remove(&message.session_id) {
                    if keyword_filter.admits(&anchor) {
                        grouper.push(anchor);
                    }
                }
            }

            if !date_ok {
                continue;
            }
            if !keyword_filter.admits(&message) {
                continue;
            }
            let should_check = grouper.push(message);
            if should_check && grouper.should_stop() {
                break;
            }
        }

        let buffered = grouper.into_messages();
        let total_messages = buffered.len();
        let groups = group_ascending(&buffered);
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

        Ok(QueryResponse {
            actual_threads: page.len(),
            actual_messages,
            conversations: page,
            total_threads,
            total_messages,
            offset: request.offset,
            limit: request.limit,
            search_match_count,
            stats,
        })
    }
}
