use crate::config::AppConfig;
use crate::db::Db;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};
use vitalcore_shared::daily::DailyMetricRow;
use vitalcore_shared::errors::CoreResult;
use vitalcore_shared::forecast::{
    ConfidenceLevel, Driver, ForecastPoint, ForecastSeries, ForecastSummary, ModelState,
    RecomputePriority, RecomputeQueueEvent, RecomputeReason, SimulatorResult, StatusChip,
    WeightGoal, WeightGoalType,
};
use vitalcore_shared::ids::UserId;

const HISTORY_DAYS: i64 = 120;

/// Polls the recompute queue at `poll_interval_ms` and re-derives each
/// queued user's weight forecast. Re-entrance is blocked by `is_processing`,
/// matching the single in-process worker model in `spec.md` §5.
pub struct ForecastWorker {
    db: Arc<Db>,
    config: Arc<AppConfig>,
    is_processing: AtomicBool,
}

impl ForecastWorker {
    #[must_use]
    pub fn new(db: Arc<Db>, config: Arc<AppConfig>) -> Self {
        Self {
            db,
            config,
            is_processing: AtomicBool::new(false),
        }
    }

    pub async fn run(&self, shutdown: Arc<Notify>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(self.config.poll_interval_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "forecast worker cycle failed");
                    }
                }
                () = shutdown.notified() => {
                    info!("forecast worker shutting down");
                    break;
                }
            }
        }
    }

    /// One drain-dedupe-process cycle (`spec.md` §4.7 steps 1-3, a-n).
    /// Returns the number of users actually recomputed.
    pub async fn run_cycle(&self) -> CoreResult<usize> {
        if self.is_processing.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }
        let result = self.run_cycle_inner().await;
        self.is_processing.store(false, Ordering::SeqCst);
        result
    }

    async fn run_cycle_inner(&self) -> CoreResult<usize> {
        let overfetch = (self.config.batch_size as i64) * 4;
        let drained = self.db.drain_recompute_queue(overfetch).await?;

        let debounce = ChronoDuration::seconds(self.config.debounce_window_seconds as i64);
        let now = Utc::now();
        let mut ready = Vec::new();
        for event in drained {
            if now - event.queued_at >= debounce {
                ready.push(event);
            } else {
                // too fresh to coalesce yet; put it back for next cycle
                self.db.enqueue_recompute(&event).await?;
            }
        }

        let mut by_user: HashMap<UserId, RecomputeQueueEvent> = HashMap::new();
        for event in ready {
            by_user
                .entry(event.user)
                .and_modify(|existing| {
                    if event.priority > existing.priority {
                        *existing = event.clone();
                    }
                })
                .or_insert(event);
        }

        let mut users: Vec<RecomputeQueueEvent> = by_user.into_values().collect();
        users.sort_by(|a, b| b.priority.cmp(&a.priority));

        let batch_size = self.config.batch_size as usize;
        let overflow = if users.len() > batch_size { users.split_off(batch_size) } else { Vec::new() };
        for event in overflow {
            self.db.enqueue_recompute(&event).await?;
        }

        let mut processed = 0usize;
        for event in &users {
            match self.process_user(event.user).await {
                Ok(()) => processed += 1,
                Err(e) => warn!(user = %event.user, error = %e, "forecast recompute failed for user"),
            }
        }
        Ok(processed)
    }

    async fn process_user(&self, user: UserId) -> CoreResult<()> {
        let today = Utc::now().date_naive();
        let from = today - ChronoDuration::days(HISTORY_DAYS);
        let daily_rows = self.db.daily_rows_in_range(user, from, today).await?;

        let existing_summary = self.db.get_forecast_summary(user).await?;
        let goal = existing_summary.as_ref().and_then(|s| s.goal.clone());
        let previous_model = existing_summary.as_ref().and_then(|s| s.model_state.clone());

        let outcome = compute_forecast(user, &daily_rows, goal.as_ref(), previous_model.as_ref(), today, self.config.horizon_days);

        self.db.upsert_forecast_summary(&outcome.summary).await?;
        for series in &outcome.series {
            self.db.replace_forecast_series(user, series).await?;
        }
        self.db.replace_forecast_drivers(user, &outcome.drivers).await?;
        Ok(())
    }

    pub async fn queue(&self, user: UserId, reason: RecomputeReason) -> CoreResult<()> {
        let priority = match reason {
            RecomputeReason::ManualRefresh | RecomputeReason::GoalChanged => RecomputePriority::High,
            RecomputeReason::NewWeightMeasurement | RecomputeReason::NewBodyCompositionMeasurement => RecomputePriority::Normal,
            RecomputeReason::ScheduledRefresh => RecomputePriority::Low,
        };
        let event = RecomputeQueueEvent {
            event_id: uuid::Uuid::new_v4(),
            user,
            reason,
            priority,
            queued_at: Utc::now(),
            requested_local_date: Utc::now().date_naive(),
        };
        self.db.enqueue_recompute(&event).await
    }
}

pub struct ForecastOutcome {
    pub summary: ForecastSummary,
    pub series: Vec<ForecastSeries>,
    pub drivers: Vec<Driver>,
}

/// Pure forecast computation: steps d-l of `spec.md` §4.7, isolated from I/O
/// so it is directly unit-testable.
#[must_use]
pub fn compute_forecast(
    user: UserId,
    daily_rows: &[DailyMetricRow],
    goal: Option<&WeightGoal>,
    previous_model: Option<&ModelState>,
    today: NaiveDate,
    horizon_days: u32,
) -> ForecastOutcome {
    let mut weighed_days: Vec<(NaiveDate, f64)> = daily_rows
        .iter()
        .filter_map(|r| r.weight_kg.map(|w| (r.local_date, w)))
        .collect();
    weighed_days.sort_by_key(|(d, _)| *d);

    let current_value = weighed_days.last().map(|(_, w)| *w);
    let model_state = fit_model(&weighed_days, today).or_else(|| previous_model.cloned());

    let confidence = confidence_level(&weighed_days, today);
    let band_multiplier = match confidence {
        ConfidenceLevel::Low => 1.8,
        ConfidenceLevel::Medium => 1.2,
        ConfidenceLevel::High => 0.9,
    };

    let slope = trend_slope(&weighed_days).or_else(|| model_state.as_ref().map(|m| m.slope_per_day)).unwrap_or(0.0);
    let base_sigma = model_state.as_ref().map_or(0.3, |m| m.residual_std_dev.max(0.05));

    let series = current_value.map(|start| {
        project_series("weight_kg", start, slope, base_sigma, band_multiplier, today, horizon_days)
    });

    let eta_date = goal.zip(current_value).and_then(|(g, current)| eta_for_goal(g, current, slope, today));

    let status_chip = status_chip(goal, current_value, eta_date, slope, today, staleness_days(&weighed_days, today));

    let drivers = build_drivers(daily_rows, slope);

    let summary = ForecastSummary {
        user,
        goal: goal.cloned(),
        eta_date,
        confidence,
        status_chip,
        current_value,
        generated_at: Utc::now(),
        model_state: model_state.clone(),
    };

    ForecastOutcome {
        summary,
        series: series.map(|s| s.into_iter().collect()).unwrap_or_default(),
        drivers,
    }
}

/// Ordinary least squares of weight against day offset, producing a
/// warm-startable `ModelState`. Requires at least 2 points.
fn fit_model(weighed_days: &[(NaiveDate, f64)], today: NaiveDate) -> Option<ModelState> {
    if weighed_days.len() < 2 {
        return None;
    }
    let n = weighed_days.len() as f64;
    let xs: Vec<f64> = weighed_days.iter().map(|(d, _)| (*d - weighed_days[0].0).num_days() as f64).collect();
    let ys: Vec<f64> = weighed_days.iter().map(|(_, w)| *w).collect();

    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var = 0.0;
    for i in 0..xs.len() {
        cov += (xs[i] - x_mean) * (ys[i] - y_mean);
        var += (xs[i] - x_mean).powi(2);
    }
    let slope = if var > 0.0 { cov / var } else { 0.0 };
    let intercept = y_mean - slope * x_mean;

    let residuals: Vec<f64> = xs.iter().zip(ys.iter()).map(|(x, y)| y - (intercept + slope * x)).collect();
    let residual_std_dev = (residuals.iter().map(|r| r.powi(2)).sum::<f64>() / n).sqrt();

    Some(ModelState {
        slope_per_day: slope,
        intercept,
        residual_std_dev,
        sample_count: weighed_days.len(),
        fitted_through: today,
    })
}

/// Average of the last 7 days' day-over-day deltas, falling back to the
/// single latest delta when fewer points are available (`spec.md` §4.7f).
fn trend_slope(weighed_days: &[(NaiveDate, f64)]) -> Option<f64> {
    if weighed_days.len() < 2 {
        return None;
    }
    let window = &weighed_days[weighed_days.len().saturating_sub(8)..];
    let mut deltas = Vec::new();
    for pair in window.windows(2) {
        let days = (pair[1].0 - pair[0].0).num_days();
        if days > 0 {
            deltas.push((pair[1].1 - pair[0].1) / days as f64);
        }
    }
    if deltas.is_empty() {
        None
    } else {
        Some(deltas.iter().sum::<f64>() / deltas.len() as f64)
    }
}

fn staleness_days(weighed_days: &[(NaiveDate, f64)], today: NaiveDate) -> i64 {
    weighed_days.last().map_or(i64::MAX, |(d, _)| (today - *d).num_days())
}

fn confidence_level(weighed_days: &[(NaiveDate, f64)], today: NaiveDate) -> ConfidenceLevel {
    let seven_days_ago = today - ChronoDuration::days(7);
    let recent_count = weighed_days.iter().filter(|(d, _)| *d > seven_days_ago).count();
    let staleness_days = staleness_days(weighed_days, today);

    if recent_count < 2 || staleness_days > 7 {
        ConfidenceLevel::Low
    } else if recent_count >= 5 && staleness_days <= 3 {
        ConfidenceLevel::High
    } else {
        ConfidenceLevel::Medium
    }
}

fn project_series(
    metric: &str,
    start: f64,
    slope: f64,
    base_sigma: f64,
    band_multiplier: f64,
    today: NaiveDate,
    horizon_days: u32,
) -> Vec<ForecastSeries> {
    let mut mid = Vec::new();
    let mut low = Vec::new();
    let mut high = Vec::new();
    for d in 0..=horizon_days {
        let date = today + ChronoDuration::days(i64::from(d));
        let value = start + slope * f64::from(d);
        let uncertainty = base_sigma * band_multiplier * (f64::from(d) / 7.0).sqrt();
        mid.push(ForecastPoint { date, value, is_projected: d > 0 });
        low.push(ForecastPoint { date, value: value - uncertainty, is_projected: d > 0 });
        high.push(ForecastPoint { date, value: value + uncertainty, is_projected: d > 0 });
    }
    vec![
        ForecastSeries { metric: metric.to_string(), points: mid },
        ForecastSeries { metric: format!("{metric}_low"), points: low },
        ForecastSeries { metric: format!("{metric}_high"), points: high },
    ]
}

fn eta_for_goal(goal: &WeightGoal, current: f64, slope: f64, today: NaiveDate) -> Option<NaiveDate> {
    if slope == 0.0 {
        return None;
    }
    let days = (goal.target_weight_kg - current) / slope;
    if !(0.0..=365.0).contains(&days) {
        return None;
    }
    let consistent = match goal.goal_type {
        WeightGoalType::Lose => slope < 0.0,
        WeightGoalType::Gain => slope > 0.0,
        WeightGoalType::Maintain => slope.abs() < 0.05,
    };
    if !consistent {
        return None;
    }
    Some(today + ChronoDuration::days(days.round() as i64))
}

/// `staleness_days` uses the same LOW-confidence threshold (7 days, see
/// `confidence_level`) — a present-but-stale `current_value` is treated as
/// no recent weight at all (`spec.md` §4.7.i, §8 scenario 5).
fn status_chip(
    goal: Option<&WeightGoal>,
    current: Option<f64>,
    eta: Option<NaiveDate>,
    slope: f64,
    today: NaiveDate,
    staleness_days: i64,
) -> StatusChip {
    let Some(goal) = goal else {
        return StatusChip::NeedsData;
    };
    if current.is_none() || staleness_days > 7 {
        return StatusChip::NeedsData;
    }

    let contradicts = match goal.goal_type {
        WeightGoalType::Lose => slope >= 0.0,
        WeightGoalType::Gain => slope <= 0.0,
        WeightGoalType::Maintain => false,
    };
    if contradicts {
        return StatusChip::AtRisk;
    }

    if let Some(target_date) = goal.target_date {
        if let Some(eta) = eta {
            if eta > target_date + ChronoDuration::weeks(2) {
                return StatusChip::AtRisk;
            }
        } else if today <= target_date {
            return StatusChip::AtRisk;
        }
    }

    StatusChip::OnTrack
}

/// Heuristic top drivers: simple rules over the recent trend, step counts,
/// and exercise minutes. A richer rule set (protein, CGM spikes) is a
/// natural follow-on once those signals are ingested.
fn build_drivers(daily_rows: &[DailyMetricRow], slope: f64) -> Vec<Driver> {
    let mut drivers = Vec::new();

    let avg_steps: f64 = {
        let values: Vec<f64> = daily_rows.iter().filter_map(|r| r.steps_total).collect();
        if values.is_empty() { 0.0 } else { values.iter().sum::<f64>() / values.len() as f64 }
    };
    if avg_steps < 7000.0 {
        drivers.push(Driver {
            rank: 1,
            id: "increase_daily_steps".to_string(),
            title: "Add 2,000 steps/day".to_string(),
            subtitle: format!("Averaging {avg_steps:.0} steps/day over the recent window"),
            confidence: ConfidenceLevel::Medium,
            deeplink: Some("vitalcore://activity/steps-goal".to_string()),
        });
    }

    if slope.abs() < 0.01 {
        drivers.push(Driver {
            rank: drivers.len() as u32 + 1,
            id: "plateau_detected".to_string(),
            title: "Weight trend has plateaued".to_string(),
            subtitle: "Consider a small caloric adjustment or a refeed week".to_string(),
            confidence: ConfidenceLevel::Medium,
            deeplink: None,
        });
    }

    let avg_exercise: f64 = {
        let values: Vec<f64> = daily_rows.iter().filter_map(|r| r.exercise_minutes).collect();
        if values.is_empty() { 0.0 } else { values.iter().sum::<f64>() / values.len() as f64 }
    };
    if avg_exercise < 20.0 {
        drivers.push(Driver {
            rank: drivers.len() as u32 + 1,
            id: "increase_exercise_minutes".to_string(),
            title: "Add a short strength session twice a week".to_string(),
            subtitle: format!("Averaging {avg_exercise:.0} exercise minutes/day"),
            confidence: ConfidenceLevel::Low,
            deeplink: None,
        });
    }

    drivers.truncate(5);
    drivers
}

/// What-if projection under a hypothetical daily-delta change, relative to
/// the fitted slope (`spec.md` §4.7k). Invoked on demand from the API, not
/// persisted by the worker cycle since the schema has no simulator table.
#[must_use]
pub fn simulate(
    user: UserId,
    model_state: &ModelState,
    hypothetical_daily_delta: f64,
    confidence: ConfidenceLevel,
    current_value: f64,
    today: NaiveDate,
    horizon_days: u32,
) -> SimulatorResult {
    let band_multiplier = match confidence {
        ConfidenceLevel::Low => 1.8,
        ConfidenceLevel::Medium => 1.2,
        ConfidenceLevel::High => 0.9,
    };
    let adjusted_slope = model_state.slope_per_day + hypothetical_daily_delta;
    let series = project_series(
        "weight_kg_simulated",
        current_value,
        adjusted_slope,
        model_state.residual_std_dev.max(0.05),
        band_multiplier,
        today,
        horizon_days,
    )
    .into_iter()
    .next()
    .unwrap();

    let projected_eta_date = if adjusted_slope.abs() > 1e-6 {
        series.points.last().map(|p| p.date)
    } else {
        None
    };

    SimulatorResult {
        user,
        hypothetical_daily_delta,
        projected_eta_date,
        projected_series: series,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: NaiveDate, weight: f64) -> DailyMetricRow {
        let mut r = DailyMetricRow::empty(UserId::random(), date, "UTC".to_string());
        r.weight_kg = Some(weight);
        r
    }

    #[test]
    fn losing_goal_with_falling_weight_is_on_track() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let rows: Vec<_> = (0..14).map(|i| row(today - ChronoDuration::days(13 - i), 90.0 - i as f64 * 0.1)).collect();
        let goal = WeightGoal {
            goal_type: WeightGoalType::Lose,
            target_weight_kg: 85.0,
            target_date: Some(today + ChronoDuration::days(200)),
            start_weight_kg: 90.0,
        };
        let outcome = compute_forecast(UserId::random(), &rows, Some(&goal), None, today, 42);
        assert!(matches!(outcome.summary.status_chip, StatusChip::OnTrack | StatusChip::AtRisk));
        assert!(outcome.summary.eta_date.is_some());
    }

    #[test]
    fn no_goal_needs_data() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let rows = vec![row(today, 80.0)];
        let outcome = compute_forecast(UserId::random(), &rows, None, None, today, 42);
        assert!(matches!(outcome.summary.status_chip, StatusChip::NeedsData));
    }

    #[test]
    fn low_confidence_with_sparse_weigh_ins() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let rows = vec![row(today - ChronoDuration::days(20), 80.0)];
        let outcome = compute_forecast(UserId::random(), &rows, None, None, today, 42);
        assert!(matches!(outcome.summary.confidence, ConfidenceLevel::Low));
    }

    /// `spec.md` §8 scenario 5: a goal is set and a weight value exists, but
    /// it's 8 days stale — a present-but-stale `current_value` must still
    /// read as `NeedsData`, not fall through to a slope-based verdict.
    #[test]
    fn stale_weigh_in_with_a_goal_still_needs_data() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let rows = vec![row(today - ChronoDuration::days(8), 80.0)];
        let goal = WeightGoal {
            goal_type: WeightGoalType::Lose,
            target_weight_kg: 75.0,
            target_date: Some(today + ChronoDuration::days(200)),
            start_weight_kg: 80.0,
        };
        let outcome = compute_forecast(UserId::random(), &rows, Some(&goal), None, today, 42);
        assert!(matches!(outcome.summary.status_chip, StatusChip::NeedsData));
    }
}
