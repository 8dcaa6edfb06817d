//! Date and keyword filter predicates applied during streaming.

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::TimeZone;
use chrono::Utc;
use chrono_tz::Tz;

use crate::types::Message;

/// Inclusive civil-date bounds, evaluated in a configured timezone.
#[derive(Debug, Clone)]
pub struct DateFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub timezone: Tz,
}

impl Default for DateFilter {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            timezone: chrono_tz::UTC,
        }
    }
}

impl DateFilter {
    pub fn matches(&self, message: &Message) -> bool {
        if self.start_date.is_none() && self.end_date.is_none() {
            return true;
        }
        let local_date = self.timezone.from_utc_datetime(&message.timestamp.naive_utc()).date_naive();
        if let Some(start) = self.start_date {
            if local_date < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if local_date > end {
                return false;
            }
        }
        true
    }
}

/// Case-insensitive substring keyword match.
///
/// `show_related_threads` does not change this predicate's admit/reject
/// decision for streaming purposes; the streaming path always admits
/// every candidate when `show_related_threads` is true and defers
/// thread-level inclusion to the grouper (see `grouper`). When false, the
/// predicate itself filters out non-matching messages.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    pub keyword: Option<String>,
    pub show_related_threads: bool,
}

impl KeywordFilter {
    pub fn message_matches(&self, message: &Message) -> bool {
        match &self.keyword {
            Some(kw) => message.content.to_lowercase().contains(&kw.to_lowercase()),
            None => true,
        }
    }

    /// Whether a candidate message should be admitted into the streaming
    /// pipeline before grouping.
    pub fn admits(&self, message: &Message) -> bool {
        if self.keyword.is_none() {
            return true;
        }
        if self.show_related_threads {
            true
        } else {
            self.message_matches(message)
        }
    }
}

pub fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}
