use crate::config::AppConfig;
use crate::db::Db;
use chrono::{Datelike, NaiveDate, Timelike, Utc};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};
use vitalcore_shared::baseline::{BaselineMetric, PersonalBaseline, WindowDays};
use vitalcore_shared::daily::DailyMetricRow;
use vitalcore_shared::errors::CoreResult;
use vitalcore_shared::ids::UserId;

const MIN_SAMPLE_COUNT: usize = 7;
const LOOKBACK_DAYS_FOR_ACTIVE_USERS: i64 = 7;

pub struct BaselineCalculator<'a> {
    pub db: &'a Db,
}

impl<'a> BaselineCalculator<'a> {
    #[must_use]
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    /// Recomputes every `(metric, window)` baseline for one user from
    /// `daily_metric_rows`, per `spec.md` §4.6. Pure arithmetic over the
    /// fetched rows — this is the part a nightly scheduled job calls.
    pub async fn recompute_all(&self, user: UserId, today: NaiveDate) -> CoreResult<Vec<PersonalBaseline>> {
        let mut baselines = Vec::new();
        for window in [WindowDays::Fourteen, WindowDays::TwentyEight, WindowDays::Ninety] {
            let from = today - chrono::Duration::days(i64::from(window.as_u32()));
            let rows = self.db.daily_rows_in_range(user, from, today).await?;
            for metric in [
                BaselineMetric::RestingHr,
                BaselineMetric::Hrv,
                BaselineMetric::RespiratoryRate,
                BaselineMetric::Steps,
            ] {
                let baseline = compute_baseline(user, metric, window, &rows);
                self.db.upsert_baseline(&baseline).await?;
                baselines.push(baseline);
            }
        }
        Ok(baselines)
    }

    pub async fn get(&self, user: UserId, metric: BaselineMetric, window: WindowDays) -> CoreResult<Option<PersonalBaseline>> {
        self.db.baseline(user, metric, window).await
    }
}

/// Ticks hourly and fires `recompute_all` for every recently-active user once
/// the UTC clock crosses `baseline_refresh_local_hour` (`spec.md` §4.6). A
/// true per-user local-time offset would need each user's timezone on file
/// ahead of any daily row; until then every user is recomputed on the same
/// UTC hour, same simplification the scoring engines make when they fall
/// back to `"UTC"` for a user with no timezone recorded yet.
pub struct BaselineWorker {
    db: Arc<Db>,
    config: Arc<AppConfig>,
    last_run_epoch_day: AtomicU32,
    is_processing: AtomicBool,
}

impl BaselineWorker {
    #[must_use]
    pub fn new(db: Arc<Db>, config: Arc<AppConfig>) -> Self {
        Self {
            db,
            config,
            last_run_epoch_day: AtomicU32::new(0),
            is_processing: AtomicBool::new(false),
        }
    }

    pub async fn run(&self, shutdown: Arc<Notify>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.maybe_run_cycle().await {
                        warn!(error = %e, "baseline worker cycle failed");
                    }
                }
                () = shutdown.notified() => {
                    info!("baseline worker shutting down");
                    break;
                }
            }
        }
    }

    async fn maybe_run_cycle(&self) -> CoreResult<()> {
        let now = Utc::now();
        let today_epoch_day = now.num_days_from_ce() as u32;
        if now.hour() != self.config.baseline_refresh_local_hour || self.last_run_epoch_day.load(Ordering::SeqCst) == today_epoch_day {
            return Ok(());
        }
        if self.is_processing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.run_cycle_inner(now.date_naive()).await;
        self.is_processing.store(false, Ordering::SeqCst);
        if result.is_ok() {
            self.last_run_epoch_day.store(today_epoch_day, Ordering::SeqCst);
        }
        result
    }

    async fn run_cycle_inner(&self, today: NaiveDate) -> CoreResult<()> {
        let since = today - chrono::Duration::days(LOOKBACK_DAYS_FOR_ACTIVE_USERS);
        let users = self.db.distinct_users_with_daily_rows_since(since).await?;
        let calculator = BaselineCalculator::new(self.db.as_ref());
        let mut recomputed = 0usize;
        for user in users {
            match calculator.recompute_all(user, today).await {
                Ok(_) => recomputed += 1,
                Err(e) => warn!(%user, error = %e, "baseline recompute failed for user"),
            }
        }
        info!(recomputed, "nightly baseline recompute pass complete");
        Ok(())
    }
}

fn extract_metric(row: &DailyMetricRow, metric: BaselineMetric) -> Option<f64> {
    match metric {
        BaselineMetric::RestingHr => row.resting_hr,
        BaselineMetric::Hrv => row.hrv_ms,
        BaselineMetric::RespiratoryRate => row.respiratory_rate,
        BaselineMetric::Steps => row.steps_total,
    }
}

/// Trailing median/p25/p75 over whatever values are present in the window.
/// Fewer than [`MIN_SAMPLE_COUNT`] points flags `insufficient_data`, so
/// downstream scorers know to fall back to global defaults (`spec.md` §4.6).
fn compute_baseline(user: UserId, metric: BaselineMetric, window: WindowDays, rows: &[DailyMetricRow]) -> PersonalBaseline {
    let mut values: Vec<f64> = rows.iter().filter_map(|r| extract_metric(r, metric)).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let sample_count = values.len();
    let (median, p25, p75) = if sample_count == 0 {
        (0.0, 0.0, 0.0)
    } else {
        (percentile(&values, 0.5), percentile(&values, 0.25), percentile(&values, 0.75))
    };

    PersonalBaseline {
        user,
        metric,
        window_days: window,
        median,
        p25,
        p75,
        sample_count,
        insufficient_data: sample_count < MIN_SAMPLE_COUNT,
        updated_at: Utc::now(),
    }
}

/// Linear-interpolation percentile over an already-sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = rank - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_with(resting_hr: Option<f64>) -> DailyMetricRow {
        let mut row = DailyMetricRow::empty(UserId::random(), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), "UTC".to_string());
        row.resting_hr = resting_hr;
        row
    }

    #[test]
    fn flags_insufficient_data_under_seven_points() {
        let rows: Vec<_> = (0..5).map(|i| row_with(Some(60.0 + i as f64))).collect();
        let baseline = compute_baseline(UserId::random(), BaselineMetric::RestingHr, WindowDays::Fourteen, &rows);
        assert!(baseline.insufficient_data);
        assert_eq!(baseline.sample_count, 5);
    }

    #[test]
    fn median_and_quartiles_over_ten_points() {
        let rows: Vec<_> = (1..=10).map(|i| row_with(Some(i as f64))).collect();
        let baseline = compute_baseline(UserId::random(), BaselineMetric::RestingHr, WindowDays::Fourteen, &rows);
        assert!(!baseline.insufficient_data);
        assert!((baseline.median - 5.5).abs() < 0.01);
        assert!((baseline.p25 - 3.25).abs() < 0.01);
        assert!((baseline.p75 - 7.75).abs() < 0.01);
    }
}
