use crate::handlers::AuthenticatedUser;
use crate::scoring::{momentum, readiness, sleep_score};
use crate::{AppError, AppResult, AppState};
use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use vitalcore_shared::baseline::{BaselineMetric, WindowDays};
use vitalcore_shared::scores::{MomentumScore, ReadinessScore, SleepScore};

const RECENT_ROWS_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
pub struct TodayQuery {
    #[serde(default)]
    age_years: Option<f64>,
}

pub async fn readiness_today(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> AppResult<Json<ReadinessScore>> {
    let local_date = Utc::now().date_naive();
    let today = state
        .db
        .daily_row(user, local_date)
        .await?
        .ok_or_else(|| AppError::NotFound("no daily metrics recorded for today".to_string()))?;

    let recent_rows = state
        .db
        .daily_rows_in_range(user, local_date - chrono::Duration::days(RECENT_ROWS_DAYS), local_date)
        .await?;

    let hrv_baseline = state.db.baseline(user, BaselineMetric::Hrv, WindowDays::TwentyEight).await?;
    let rhr_baseline = state.db.baseline(user, BaselineMetric::RestingHr, WindowDays::TwentyEight).await?;

    let sleep_night = state.db.sleep_nights_in_range(user, local_date, local_date).await?;
    let sleep_subscore = match sleep_night.first() {
        Some(night) => {
            let score = sleep_score::compute(&sleep_score::SleepScoreInputs {
                user,
                today: night,
                recent_bedtimes: &[],
                hrv_baseline: hrv_baseline.as_ref(),
                rhr_baseline: rhr_baseline.as_ref(),
                today_daily_row: &today,
                age_years: None,
            });
            Some(score.score)
        }
        None => None,
    };

    let baseline_history_days = hrv_baseline
        .as_ref()
        .map(|b| b.sample_count)
        .into_iter()
        .chain(rhr_baseline.as_ref().map(|b| b.sample_count))
        .max()
        .unwrap_or(0) as u32;

    let score = readiness::compute(&readiness::ReadinessInputs {
        user,
        local_date,
        today: &today,
        sleep_subscore,
        hrv_baseline: hrv_baseline.as_ref(),
        rhr_baseline: rhr_baseline.as_ref(),
        recent_rows: &recent_rows,
        baseline_history_days,
        calibration_threshold_days: state.config.readiness_calibration_days,
    })?;
    Ok(Json(score))
}

pub async fn sleep_today(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(q): Query<TodayQuery>,
) -> AppResult<Json<SleepScore>> {
    let local_date = Utc::now().date_naive();
    let nights = state
        .db
        .sleep_nights_in_range(user, local_date - chrono::Duration::days(RECENT_ROWS_DAYS), local_date)
        .await?;
    let night = nights
        .last()
        .filter(|n| n.sleep_date == local_date)
        .ok_or_else(|| AppError::NotFound("no sleep data recorded for last night".to_string()))?;

    let recent_bedtimes: Vec<_> = nights.iter().filter(|n| n.sleep_date != local_date).map(|n| n.bedtime_local).collect();

    let today_daily_row = state
        .db
        .daily_row(user, local_date)
        .await?
        .unwrap_or_else(|| vitalcore_shared::daily::DailyMetricRow::empty(user, local_date, night.timezone.clone()));

    let hrv_baseline = state.db.baseline(user, BaselineMetric::Hrv, WindowDays::TwentyEight).await?;
    let rhr_baseline = state.db.baseline(user, BaselineMetric::RestingHr, WindowDays::TwentyEight).await?;

    let score = sleep_score::compute(&sleep_score::SleepScoreInputs {
        user,
        today: night,
        recent_bedtimes: &recent_bedtimes,
        hrv_baseline: hrv_baseline.as_ref(),
        rhr_baseline: rhr_baseline.as_ref(),
        today_daily_row: &today_daily_row,
        age_years: q.age_years,
    });
    Ok(Json(score))
}

pub async fn momentum_today(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> AppResult<Json<MomentumScore>> {
    let local_date = Utc::now().date_naive();
    let today = state
        .db
        .daily_row(user, local_date)
        .await?
        .ok_or_else(|| AppError::NotFound("no daily metrics recorded for today".to_string()))?;

    let hrv_baseline = state.db.baseline(user, BaselineMetric::Hrv, WindowDays::TwentyEight).await?;
    let rhr_baseline = state.db.baseline(user, BaselineMetric::RestingHr, WindowDays::TwentyEight).await?;
    let respiratory_baseline = state.db.baseline(user, BaselineMetric::RespiratoryRate, WindowDays::TwentyEight).await?;

    let sleep_duration_subscore = state
        .db
        .sleep_nights_in_range(user, local_date, local_date)
        .await?
        .first()
        .map(|n| (n.total_sleep_min / 450.0 * 100.0).clamp(0.0, 100.0));

    let score = momentum::compute(&momentum::MomentumInputs {
        user,
        today: &today,
        hrv_baseline: hrv_baseline.as_ref(),
        rhr_baseline: rhr_baseline.as_ref(),
        respiratory_baseline: respiratory_baseline.as_ref(),
        sleep_duration_subscore,
    });
    Ok(Json(score))
}
