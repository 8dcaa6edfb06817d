//! Session-block and rolling-weekly token usage accounting.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use std::time::Instant;

use chrono::DateTime;
use chrono::Duration as ChronoDuration;
use chrono::NaiveTime;
use chrono::TimeZone;
use chrono::Timelike;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::types::UsageSample;
use crate::usage::plan_limits::PlanLimits;

const SESSION_BLOCK_BOUNDARIES: [u32; 5] = [0, 4, 9, 14, 19];
const CACHE_TTL: Duration = Duration::from_secs(300);

fn apply_correction_factor(value: u64, factor: f64) -> f64 {
    (value as f64 * factor * 10.0).round() / 10.0
}

/// `[start, end)` of the fixed 5-hour UTC session block containing `now`.
pub fn current_session_block(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let hour = now.hour();
    let idx = SESSION_BLOCK_BOUNDARIES
        .iter()
        .rposition(|&b| b <= hour)
        .unwrap_or(0);
    let start_hour = SESSION_BLOCK_BOUNDARIES[idx];
    let date = now.date_naive();
    let start = Utc
        .from_utc_datetime(&date.and_time(NaiveTime::from_hms_opt(start_hour, 0, 0).unwrap()));

    let end = if idx + 1 < SESSION_BLOCK_BOUNDARIES.len() {
        let end_hour = SESSION_BLOCK_BOUNDARIES[idx + 1];
        Utc.from_utc_datetime(&date.and_time(NaiveTime::from_hms_opt(end_hour, 0, 0).unwrap()))
    } else {
        let next_day = date.succ_opt().unwrap_or(date);
        Utc.from_utc_datetime(&next_day.and_time(NaiveTime::from_hms_opt(0, 0, 0).unwrap()))
    };

    (start, end)
}

/// Raw plus corrected totals for one accounting horizon.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HorizonReport {
    pub raw_tokens: u64,
    pub corrected_tokens: f64,
    pub factor: f64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub entries: usize,
    pub limit_tokens: Option<u64>,
    pub percentage_used: Option<f64>,
    pub percentage_is_estimate: bool,
}

fn build_horizon(samples: impl Iterator<Item = UsageSample> + Clone, factor: f64, limit: Option<u64>, is_estimate: bool) -> HorizonReport {
    let mut raw_tokens = 0u64;
    let mut cache_creation = 0u64;
    let mut cache_read = 0u64;
    let mut entries = 0usize;
    for sample in samples {
        raw_tokens += sample.total_tokens();
        cache_creation += sample.cache_creation_tokens;
        cache_read += sample.cache_read_tokens;
        entries += 1;
    }
    let percentage_used = limit.filter(|&l| l > 0).map(|l| (raw_tokens as f64 / l as f64) * 100.0);
    HorizonReport {
        raw_tokens,
        corrected_tokens: apply_correction_factor(raw_tokens, factor),
        factor,
        cache_creation_tokens: cache_creation,
        cache_read_tokens: cache_read,
        entries,
        limit_tokens: limit,
        percentage_used,
        percentage_is_estimate: is_estimate,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageReport {
    pub available: bool,
    pub error: Option<String>,
    pub plan: String,
    pub session_start: Option<DateTime<Utc>>,
    pub session_end: Option<DateTime<Utc>>,
    pub reset_time: Option<DateTime<Utc>>,
    pub current_session: HorizonReport,
    pub weekly_all: HorizonReport,
    pub weekly_per_model: BTreeMap<String, HorizonReport>,
}

struct CachedReport {
    block_start: DateTime<Utc>,
    stamp: Instant,
    report: UsageReport,
}

/// Computes and caches usage reports. Construction takes a `PlanLimits`
/// collaborator so the actual subscription constant table stays external.
pub struct UsageEngine<P: PlanLimits> {
    plan: String,
    plan_limits: P,
    correction_session: f64,
    correction_weekly_all: f64,
    correction_weekly_per_model: f64,
    cache: RwLock<Option<CachedReport>>,
}

impl<P: PlanLimits> UsageEngine<P> {
    pub fn new(
        plan: String,
        plan_limits: P,
        correction_session: f64,
        correction_weekly_all: f64,
        correction_weekly_per_model: f64,
    ) -> Self {
        Self {
            plan,
            plan_limits,
            correction_session,
            correction_weekly_all,
            correction_weekly_per_model,
            cache: RwLock::new(None),
        }
    }

    /// Return the usage report for `now`, calling `fetch_samples` (a full
    /// corpus scan) only on a cache miss.
    ///
    /// `models` names the per-model weekly horizons to report, each
    /// matched case-insensitively as a substring against each sample's
    /// `model` field -- this resolves the Opus/Sonnet-specific divergence
    /// in the reference implementation into one generic mechanism.
    pub async fn get_report<F, Fut>(
        &self,
        now: DateTime<Utc>,
        models: &[String],
        fetch_samples: F,
    ) -> UsageReport
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::io::Result<Vec<UsageSample>>>,
    {
        let (block_start, block_end) = current_session_block(now);

        {
            let cached = self.cache.read().await;
            if let Some(cached) = cached.as_ref() {
                if cached.block_start == block_start && cached.stamp.elapsed() < CACHE_TTL {
                    return cached.report.clone();
                }
            }
        }

        let samples = match fetch_samples().await {
            Ok(samples) => samples,
            Err(err) => {
                return UsageReport {
                    available: false,
                    error: Some(err.to_string()),
                    plan: self.plan.clone(),
                    ..Default::default()
                };
            }
        };

        let report = self.build_report(now, block_start, block_end, models, &samples);

        *self.cache.write().await = Some(CachedReport {
            block_start,
            stamp: Instant::now(),
            report: report.clone(),
        });

        report
    }

    fn build_report(
        &self,
        now: DateTime<Utc>,
        block_start: DateTime<Utc>,
        block_end: DateTime<Utc>,
        models: &[String],
        samples: &[UsageSample],
    ) -> UsageReport {
        let session_samples: Vec<UsageSample> = samples
            .iter()
            .filter(|s| s.timestamp >= block_start && s.timestamp < block_end)
            .cloned()
            .collect();

        let week_start = now - ChronoDuration::days(7);
        let weekly_all_samples: Vec<UsageSample> = samples
            .iter()
            .filter(|s| s.timestamp >= week_start && s.timestamp < now)
            .cloned()
            .collect();

        let session_limit = self.plan_limits.session_token_limit(&self.plan);
        let weekly_hint = self.plan_limits.weekly_hint(&self.plan);

        let current_session = build_horizon(
            session_samples.into_iter(),
            self.correction_session,
            session_limit,
            false,
        );
        let weekly_all = build_horizon(
            weekly_all_samples.iter().cloned(),
            self.correction_weekly_all,
            weekly_hint.estimated_token_budget,
            true,
        );

        let mut weekly_per_model = BTreeMap::new();
        for model in models {
            let lower = model.to_lowercase();
            let matching = weekly_all_samples
                .iter()
                .filter(|s| s.model.to_lowercase().contains(&lower))
                .cloned();
            weekly_per_model.insert(
                model.clone(),
                build_horizon(
                    matching,
                    self.correction_weekly_per_model,
                    weekly_hint.estimated_token_budget,
                    true,
                ),
            );
        }

        UsageReport {
            available: true,
            error: None,
            plan: self.plan.clone(),
            session_start: Some(block_start),
            session_end: Some(block_end),
            reset_time: Some(block_end),
            current_session,
            weekly_all,
            weekly_per_model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::plan_limits::NullPlanLimits;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn sample(ts: DateTime<Utc>, model: &str, input: u64, output: u64) -> UsageSample {
        UsageSample {
            timestamp: ts,
            model: model.to_string(),
            input_tokens: input,
            output_tokens: output,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
        }
    }

    #[test]
    fn session_block_matches_spec_scenario() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 15, 30, 0).unwrap();
        let (start, end) = current_session_block(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 1, 1, 14, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 1, 1, 19, 0, 0).unwrap());
    }

    #[test]
    fn session_block_wraps_past_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 20, 0, 0).unwrap();
        let (start, end) = current_session_block(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 1, 1, 19, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn usage_report_matches_spec_scenario_six() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 15, 30, 0).unwrap();
        let samples = vec![
            sample(Utc.with_ymd_and_hms(2026, 1, 1, 14, 5, 0).unwrap(), "claude-opus-4", 100, 200),
            sample(Utc.with_ymd_and_hms(2026, 1, 1, 15, 20, 0).unwrap(), "claude-sonnet-4", 50, 50),
            sample(Utc.with_ymd_and_hms(2026, 1, 1, 19, 5, 0).unwrap(), "claude-opus-4", 1000, 1000),
        ];

        let engine = UsageEngine::new("max_20x".to_string(), NullPlanLimits, 1.0, 1.0, 1.0);
        let models = vec!["sonnet".to_string()];
        let report = engine
            .get_report(now, &models, || async { Ok(samples.clone()) })
            .await;

        assert_eq!(report.current_session.raw_tokens, 400);
        assert_eq!(report.reset_time, Some(Utc.with_ymd_and_hms(2026, 1, 1, 19, 0, 0).unwrap()));
        let sonnet = &report.weekly_per_model["sonnet"];
        assert_eq!(sonnet.raw_tokens, 100);
    }

    #[tokio::test]
    async fn cache_hit_skips_refetch_within_ttl() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 15, 30, 0).unwrap();
        let engine = UsageEngine::new("max_20x".to_string(), NullPlanLimits, 1.0, 1.0, 1.0);
        let models: Vec<String> = vec![];

        let _first = engine.get_report(now, &models, || async { Ok(vec![]) }).await;
        let called = std::sync::atomic::AtomicBool::new(false);
        let _second = engine
            .get_report(now, &models, || async {
                called.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(vec![])
            })
            .await;
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }
}
