//! Structured logging setup.
//!
//! Mirrors the configurable-timer formatter pattern used elsewhere in the
//! workspace: log timestamps can be rendered in UTC or in local time,
//! independent of the display timezone used for date-predicate arithmetic
//! (see `config::HistoryConfig::display_timezone`).

use chrono::Local;
use chrono::Utc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

/// Which clock the log formatter reads timestamps from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogClock {
    Local,
    Utc,
}

/// `FormatTime` implementation that switches between local and UTC clocks.
pub struct ConfigurableTimer(pub LogClock);

impl FormatTime for ConfigurableTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        match self.0 {
            LogClock::Local => write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f")),
            LogClock::Utc => write!(w, "{}", Utc::now().format("%Y-%m-%d %H:%M:%S%.3fZ")),
        }
    }
}

/// Install a global `tracing` subscriber driven by `CC_HISTORY_LOG_LEVEL`.
///
/// Idempotent-ish: a second call is a no-op (the underlying
/// `tracing::subscriber::set_global_default` error is swallowed) so tests
/// and multiple `HistoryService` constructions in one process don't panic.
pub fn init_tracing(level: &str, clock: LogClock) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ConfigurableTimer(clock))
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
