//! Configuration for the history crate.
//!
//! Sourced from environment variables (`CC_HISTORY_*`) rather than a
//! project-local TOML file, since there is no per-workdir config surface in
//! this domain. Per-field default functions and a two-tier validation split
//! (hard `HistoryError::ConfigError` vs. soft `ConfigWarning`) follow the
//! same shape the rest of the workspace uses for its layered configs.

use std::env;
use std::path::PathBuf;

use crate::error::HistoryError;
use crate::error::Result;
use crate::logging::LogClock;

/// Top-level configuration for a `HistoryService`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryConfig {
    /// Root directory of project subdirectories.
    pub root: PathBuf,
    /// Allow-list of source paths; empty means "no filter".
    pub allowed_projects: Vec<String>,
    /// IANA timezone name used for date-predicate civil-date conversion
    /// and usage-report boundary display.
    pub display_timezone: String,
    /// `tracing-subscriber` `EnvFilter` directive.
    pub log_level: String,
    /// Plan identifier passed to the `PlanLimits` collaborator.
    pub plan: String,
    pub correction_session: f64,
    pub correction_weekly_all: f64,
    pub correction_weekly_per_model: f64,
}

fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("projects")
}

fn default_display_timezone() -> String {
    "America/New_York".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_plan() -> String {
    "max_20x".to_string()
}

fn default_correction_session() -> f64 {
    0.24
}

fn default_correction_weekly_all() -> f64 {
    0.20
}

fn default_correction_weekly_per_model() -> f64 {
    0.18
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            allowed_projects: Vec::new(),
            display_timezone: default_display_timezone(),
            log_level: default_log_level(),
            plan: default_plan(),
            correction_session: default_correction_session(),
            correction_weekly_all: default_correction_weekly_all(),
            correction_weekly_per_model: default_correction_weekly_per_model(),
        }
    }
}

/// Non-fatal configuration issues; callers may log these and proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// The allow-list was set but matches no directory under `root`.
    EmptyAllowList,
}

impl HistoryConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable in a non-fatal way.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("CC_HISTORY_ROOT") {
            if v.trim().is_empty() {
                return Err(HistoryError::ConfigError {
                    field: "CC_HISTORY_ROOT".to_string(),
                    cause: "must not be empty".to_string(),
                });
            }
            cfg.root = PathBuf::from(v);
        }

        if let Ok(v) = env::var("CC_HISTORY_ALLOWED_PROJECTS") {
            cfg.allowed_projects = parse_allow_list(&v);
        }

        if let Ok(v) = env::var("CC_HISTORY_TIMEZONE") {
            if v.parse::<chrono_tz::Tz>().is_err() {
                return Err(HistoryError::ConfigError {
                    field: "CC_HISTORY_TIMEZONE".to_string(),
                    cause: format!("not a recognized IANA timezone name: {v}"),
                });
            }
            cfg.display_timezone = v;
        }

        if let Ok(v) = env::var("CC_HISTORY_LOG_LEVEL") {
            cfg.log_level = v;
        }

        if let Ok(v) = env::var("CC_HISTORY_PLAN") {
            cfg.plan = v;
        }

        cfg.correction_session =
            parse_correction_factor("CC_HISTORY_CORRECTION_SESSION", cfg.correction_session)?;
        cfg.correction_weekly_all = parse_correction_factor(
            "CC_HISTORY_CORRECTION_WEEKLY_ALL",
            cfg.correction_weekly_all,
        )?;
        cfg.correction_weekly_per_model = parse_correction_factor(
            "CC_HISTORY_CORRECTION_WEEKLY_PER_MODEL",
            cfg.correction_weekly_per_model,
        )?;

        Ok(cfg)
    }

    /// Soft validation: issues worth logging but not rejecting.
    ///
    /// Requires a directory listing of `root`'s children (hidden dirs
    /// already excluded) to decide whether the allow-list matched nothing.
    pub fn soft_validate(&self, project_dir_names: &[String]) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if !self.allowed_projects.is_empty() {
            let matched = project_dir_names
                .iter()
                .any(|name| self.allowed_projects.iter().any(|p| p == name));
            if !matched {
                warnings.push(ConfigWarning::EmptyAllowList);
            }
        }
        warnings
    }

    pub fn log_clock(&self) -> LogClock {
        LogClock::Utc
    }

    pub fn timezone(&self) -> chrono_tz::Tz {
        self.display_timezone.parse().unwrap_or(chrono_tz::UTC)
    }
}

fn parse_correction_factor(var: &str, default: f64) -> Result<f64> {
    match env::var(var) {
        Ok(v) => {
            let parsed: f64 = v.parse().map_err(|_| HistoryError::ConfigError {
                field: var.to_string(),
                cause: format!("not a valid floating-point number: {v}"),
            })?;
            if !parsed.is_finite() || parsed < 0.0 {
                return Err(HistoryError::ConfigError {
                    field: var.to_string(),
                    cause: format!("must be a non-negative finite number, got {parsed}"),
                });
            }
            Ok(parsed)
        }
        Err(_) => Ok(default),
    }
}

/// Accepts either a comma-separated list or a JSON array of strings.
fn parse_allow_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.starts_with('[') {
        if let Ok(values) = serde_json::from_str::<Vec<String>>(trimmed) {
            return values;
        }
    }
    trimmed
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
