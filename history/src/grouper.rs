//! Thread grouper: groups an ascending-timestamp message stream into
//! thread groups, with early termination once enough pages are available.

use crate::filters::KeywordFilter;
use crate::types::AnnotatedMessage;
use crate::types::Message;
use crate::types::MessageRole;
use crate::types::ThreadGroup;

/// Requested sort order for the returned group list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Desc
    }
}

const GROUPING_INTERVAL: usize = 50;

/// Group a fully-buffered, ascending-timestamp slice of messages.
///
/// A group with no leading `user` message (orphan assistant messages at
/// the very start of the buffer) is dropped rather than merged into a
/// preceding group, since no preceding group exists within this slice.
pub fn group_ascending(messages: &[Message]) -> Vec<ThreadGroup> {
    let mut groups: Vec<Vec<Message>> = Vec::new();
    for message in messages {
        match message.role {
            MessageRole::User => {
                groups.push(vec![message.clone()]);
            }
            MessageRole::Assistant => {
                if let Some(current) = groups.last_mut() {
                    current.push(message.clone());
                }
                // else: orphan assistant message with no preceding user
                // message in this slice -- dropped.
            }
        }
    }
    groups
        .into_iter()
        .map(|messages| ThreadGroup {
            messages: messages.into_iter().map(AnnotatedMessage::unannotated).collect(),
        })
        .collect()
}

/// Apply keyword-based thread inclusion and annotation after grouping.
/// Only relevant when `show_related_threads` is true and a keyword is
/// set; a no-op keyword filter returns groups unchanged.
pub fn apply_keyword_annotations(groups: Vec<ThreadGroup>, filter: &KeywordFilter) -> (Vec<ThreadGroup>, usize) {
    let Some(keyword) = filter.keyword.clone() else {
        return (groups, 0);
    };
    if !filter.show_related_threads {
        // Non-related mode: the filter already excluded non-matching
        // messages upstream, so every surviving message in a group is
        // itself a match; still stamp annotations for consistency.
        let mut match_count = 0usize;
        let annotated = groups
            .into_iter()
            .map(|mut group| {
                for m in group.messages.iter_mut() {
                    m.annotation.is_search_match = true;
                    m.annotation.search_keyword = Some(keyword.clone());
                    match_count += 1;
                }
                group
            })
            .collect();
        return (annotated, match_count);
    }

    let mut match_count = 0usize;
    let kept: Vec<ThreadGroup> = groups
        .into_iter()
        .filter_map(|mut group| {
            let mut any_match = false;
            for m in group.messages.iter_mut() {
                let is_match = filter.message_matches(&m.message);
                m.annotation.is_search_match = is_match;
                m.annotation.search_keyword = Some(keyword.clone());
                if is_match {
                    any_match = true;
                }
            }
            if any_match {
                match_count += group.messages.iter().filter(|m| m.annotation.is_search_match).count();
                Some(group)
            } else {
                None
            }
        })
        .collect();
    (kept, match_count)
}

/// Reverse group order for `desc`; intra-group order is always ascending
/// regardless of the requested sort order.
pub fn apply_sort_order(mut groups: Vec<ThreadGroup>, order: SortOrder) -> Vec<ThreadGroup> {
    if order == SortOrder::Desc {
        groups.reverse();
    }
    groups
}

/// Incrementally buffers a streaming message source and decides when
/// enough groups exist to satisfy `offset + limit` with the documented
/// 1.5x safety margin for subsequent keyword filtering.
pub struct EarlyTerminatingGrouper {
    buffer: Vec<Message>,
    target_groups: usize,
}

impl EarlyTerminatingGrouper {
    pub fn new(offset: usize, limit: usize) -> Self {
        let target_groups = ((offset + limit) as f64 * 1.5).ceil() as usize;
        Self {
            buffer: Vec::new(),
            target_groups,
        }
    }

    /// Feed one message; returns `true` once the buffer should be
    /// regrouped and checked against the termination condition (every
    /// `GROUPING_INTERVAL` messages).
    pub fn push(&mut self, message: Message) -> bool {
        self.buffer.push(message);
        self.buffer.len() % GROUPING_INTERVAL == 0
    }

    pub fn should_stop(&self) -> bool {
        group_ascending(&self.buffer).len() >= self.target_groups
    }

    pub fn total_messages(&self) -> usize {
        self.buffer.len()
    }

    /// Consume the grouper, returning the buffered messages for a final
    /// grouping pass.
    pub fn into_messages(self) -> Vec<Message> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::parse_rfc3339;
    use crate::types::Project;

    fn msg(ts: &str, role: MessageRole, content: &str) -> Message {
        Message {
            timestamp: parse_rfc3339(ts).unwrap(),
            role,
            content: content.to_string(),
            session_id: "s".to_string(),
            uuid: None,
            filename: "f.jsonl".into(),
            project: Project {
                id: "-p".to_string(),
                display_name: "-p".to_string(),
                path: "/tmp".into(),
            },
            continued_from_uuid: None,
            parent_session_id: None,
            is_continuation_session: false,
        }
    }

    #[test]
    fn groups_user_turn_with_trailing_assistants() {
        let messages = vec![
            msg("2026-01-01T10:00:00Z", MessageRole::User, "hi"),
            msg("2026-01-01T10:01:00Z", MessageRole::Assistant, "hello"),
            msg("2026-01-01T10:02:00Z", MessageRole::Assistant, "more"),
            msg("2026-01-01T10:03:00Z", MessageRole::User, "bye"),
        ];
        let groups = group_ascending(&messages);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].messages.len(), 3);
        assert_eq!(groups[1].messages.len(), 1);
    }

    #[test]
    fn desc_reverses_groups_but_not_intra_group_order() {
        let messages = vec![
            msg("2026-01-01T10:00:00Z", MessageRole::User, "hi"),
            msg("2026-01-01T10:01:00Z", MessageRole::Assistant, "hello"),
            msg("2026-01-01T10:03:00Z", MessageRole::User, "bye"),
        ];
        let groups = group_ascending(&messages);
        let reversed = apply_sort_order(groups, SortOrder::Desc);
        assert_eq!(reversed[0].messages[0].message.content, "bye");
        assert_eq!(reversed[1].messages[0].message.content, "hi");
        assert_eq!(reversed[1].messages[1].message.content, "hello");
    }

    #[test]
    fn keyword_related_threads_keeps_whole_group_and_annotates() {
        let messages = vec![
            msg("2026-01-01T10:00:00Z", MessageRole::User, "selenium"),
            msg("2026-01-01T10:01:00Z", MessageRole::Assistant, "ok"),
            msg("2026-01-01T10:02:00Z", MessageRole::User, "python"),
            msg("2026-01-01T10:03:00Z", MessageRole::Assistant, "great"),
            msg("2026-01-01T10:04:00Z", MessageRole::User, "selenium again"),
            msg("2026-01-01T10:05:00Z", MessageRole::Assistant, "sure"),
        ];
        let groups = group_ascending(&messages);
        let filter = KeywordFilter {
            keyword: Some("selenium".to_string()),
            show_related_threads: true,
        };
        let (kept, match_count) = apply_keyword_annotations(groups, &filter);
        assert_eq!(kept.len(), 2);
        assert_eq!(match_count, 2);
        assert!(kept[0].messages[0].annotation.is_search_match);
        assert!(!kept[0].messages[1].annotation.is_search_match);
    }

    #[test]
    fn early_terminating_grouper_stops_at_target() {
        let mut grouper = EarlyTerminatingGrouper::new(0, 1);
        assert_eq!(grouper.target_groups, 2);
        for i in 0..60 {
            let ts = format!("2026-01-01T00:{:02}:00Z", i % 60);
            let role = if i % 2 == 0 { MessageRole::User } else { MessageRole::Assistant };
            let should_check = grouper.push(msg(&ts, role, "x"));
            if should_check && grouper.should_stop() {
                break;
            }
        }
        assert!(grouper.should_stop());
    }
}
