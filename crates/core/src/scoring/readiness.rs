use super::{clamp_0_100, deviation_subscore};
use chrono::{DateTime, NaiveDate, Utc};
use vitalcore_shared::baseline::PersonalBaseline;
use vitalcore_shared::daily::DailyMetricRow;
use vitalcore_shared::errors::{CoreError, CoreResult};
use vitalcore_shared::ids::UserId;
use vitalcore_shared::scores::{ReadinessBand, ReadinessScore};

const SLEEP_WEIGHT: f64 = 0.35;
const RECOVERY_WEIGHT: f64 = 0.30;
const LOAD_WEIGHT: f64 = 0.20;
const TREND_WEIGHT: f64 = 0.15;

/// Inputs a Readiness computation needs, gathered by the caller from the
/// daily aggregate, the already-computed Sleep score, and personal
/// baselines (`spec.md` §4.5).
pub struct ReadinessInputs<'a> {
    pub user: UserId,
    pub local_date: NaiveDate,
    pub today: &'a DailyMetricRow,
    pub sleep_subscore: Option<f64>,
    pub hrv_baseline: Option<&'a PersonalBaseline>,
    pub rhr_baseline: Option<&'a PersonalBaseline>,
    pub recent_rows: &'a [DailyMetricRow],
    /// Actual days of personal-baseline history the user has accrued so
    /// far (e.g. the larger of the HRV/RHR baseline sample counts), not
    /// the configured threshold itself.
    pub baseline_history_days: u32,
    /// `AppConfig::readiness_calibration_days` — below this, `is_calibrating`
    /// is set (`spec.md` §4.5, `SPEC_FULL.md` §2 "READINESS_CALIBRATION_DAYS").
    pub calibration_threshold_days: u32,
}

/// Pure function of today's daily metrics, personal baselines, and the prior
/// week's rows. Returns `InsufficientData` only when there is no daily row
/// signal to score at all — otherwise emits a score annotated
/// `is_calibrating` (`spec.md` §4.5).
pub fn compute(inputs: &ReadinessInputs<'_>) -> CoreResult<ReadinessScore> {
    let ReadinessInputs {
        user,
        local_date,
        today,
        sleep_subscore,
        hrv_baseline,
        rhr_baseline,
        recent_rows,
        baseline_history_days,
        calibration_threshold_days,
    } = inputs;

    if today.resting_hr.is_none() && today.hrv_ms.is_none() && sleep_subscore.is_none() && today.steps_total.is_none() {
        return Err(CoreError::InsufficientData(
            "no daily signal available to compute readiness".to_string(),
        ));
    }

    let sleep_score = sleep_subscore.unwrap_or(50.0);

    let recovery_score = recovery_subscore(today, *hrv_baseline, *rhr_baseline);
    let load_score = load_subscore(today, recent_rows);
    let trend_score = trend_subscore(recent_rows);

    let score = clamp_0_100(
        sleep_score * SLEEP_WEIGHT + recovery_score * RECOVERY_WEIGHT + load_score * LOAD_WEIGHT + trend_score * TREND_WEIGHT,
    );

    let band = if score < 40.0 {
        ReadinessBand::Low
    } else if score <= 70.0 {
        ReadinessBand::Moderate
    } else {
        ReadinessBand::High
    };

    Ok(ReadinessScore {
        user: *user,
        local_date: *local_date,
        score,
        sleep_score,
        recovery_score,
        load_score,
        trend_score,
        band,
        is_calibrating: *baseline_history_days < *calibration_threshold_days,
        daily_row_updated_at: today.updated_at,
        generated_at: Utc::now(),
    })
}

fn recovery_subscore(today: &DailyMetricRow, hrv_baseline: Option<&PersonalBaseline>, rhr_baseline: Option<&PersonalBaseline>) -> f64 {
    let mut parts = Vec::new();
    if let (Some(hrv), Some(baseline)) = (today.hrv_ms, hrv_baseline) {
        if !baseline.insufficient_data {
            let spread = (baseline.p75 - baseline.p25).max(1.0);
            parts.push(deviation_subscore(hrv, baseline.median, spread));
        }
    }
    if let (Some(rhr), Some(baseline)) = (today.resting_hr, rhr_baseline) {
        if !baseline.insufficient_data {
            // lower resting HR than baseline is recovery, not a deviation penalty
            let spread = (baseline.p75 - baseline.p25).max(1.0);
            let inverted = 2.0 * baseline.median - rhr;
            parts.push(deviation_subscore(inverted, baseline.median, spread));
        }
    }
    if parts.is_empty() {
        50.0
    } else {
        parts.iter().sum::<f64>() / parts.len() as f64
    }
}

fn load_subscore(today: &DailyMetricRow, recent_rows: &[DailyMetricRow]) -> f64 {
    let recent_avg_exercise: f64 = {
        let values: Vec<f64> = recent_rows.iter().filter_map(|r| r.exercise_minutes).collect();
        if values.is_empty() {
            return 60.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    };
    let today_exercise = today.exercise_minutes.unwrap_or(0.0);
    if recent_avg_exercise <= 0.0 {
        return 60.0;
    }
    // high sustained load relative to the recent trailing average lowers readiness
    let ratio = today_exercise / recent_avg_exercise;
    clamp_0_100(100.0 - (ratio - 1.0).max(0.0) * 40.0)
}

fn trend_subscore(recent_rows: &[DailyMetricRow]) -> f64 {
    let values: Vec<(DateTime<Utc>, f64)> = recent_rows
        .iter()
        .filter_map(|r| r.resting_hr.map(|hr| (r.updated_at, hr)))
        .collect();
    if values.len() < 2 {
        return 60.0;
    }
    let first = values.first().unwrap().1;
    let last = values.last().unwrap().1;
    let delta = last - first;
    // a falling resting heart rate over the window reads as improving trend
    clamp_0_100(60.0 - delta * 3.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitalcore_shared::baseline::{BaselineMetric, WindowDays};

    fn row() -> DailyMetricRow {
        let mut row = DailyMetricRow::empty(UserId::random(), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), "UTC".to_string());
        row.resting_hr = Some(58.0);
        row.hrv_ms = Some(65.0);
        row.steps_total = Some(8000.0);
        row.exercise_minutes = Some(30.0);
        row
    }

    fn baseline(median: f64) -> PersonalBaseline {
        PersonalBaseline {
            user: UserId::random(),
            metric: BaselineMetric::Hrv,
            window_days: WindowDays::TwentyEight,
            median,
            p25: median - 5.0,
            p75: median + 5.0,
            sample_count: 20,
            insufficient_data: false,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn flags_calibrating_under_fourteen_days() {
        let today = row();
        let hrv_baseline = baseline(65.0);
        let inputs = ReadinessInputs {
            user: UserId::random(),
            local_date: today.local_date,
            today: &today,
            sleep_subscore: Some(80.0),
            hrv_baseline: Some(&hrv_baseline),
            rhr_baseline: None,
            recent_rows: &[],
            baseline_history_days: 5,
            calibration_threshold_days: 14,
        };
        let score = compute(&inputs).unwrap();
        assert!(score.is_calibrating);
        assert!(score.score > 0.0 && score.score <= 100.0);
    }

    #[test]
    fn fails_with_no_signal_at_all() {
        let empty = DailyMetricRow::empty(UserId::random(), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), "UTC".to_string());
        let inputs = ReadinessInputs {
            user: UserId::random(),
            local_date: empty.local_date,
            today: &empty,
            sleep_subscore: None,
            hrv_baseline: None,
            rhr_baseline: None,
            recent_rows: &[],
            baseline_history_days: 30,
            calibration_threshold_days: 14,
        };
        assert!(matches!(compute(&inputs), Err(CoreError::InsufficientData(_))));
    }
}
