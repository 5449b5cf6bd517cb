use super::{clamp_0_100, deviation_subscore};
use chrono::{NaiveTime, Timelike, Utc};
use vitalcore_shared::baseline::PersonalBaseline;
use vitalcore_shared::daily::DailyMetricRow;
use vitalcore_shared::ids::UserId;
use vitalcore_shared::scores::{SleepLabel, SleepScore};
use vitalcore_shared::sleep::SleepNight;

const DURATION_WEIGHT: f64 = 0.25;
const EFFICIENCY_WEIGHT: f64 = 0.25;
const STRUCTURE_WEIGHT: f64 = 0.2;
const CONSISTENCY_WEIGHT: f64 = 0.15;
const RECOVERY_WEIGHT: f64 = 0.15;

const TARGET_TOTAL_SLEEP_MIN: f64 = 450.0;

/// Age-banded deep+REM percentage target, loosely modelled on the
/// well-known decline of slow-wave sleep share with age.
fn structure_target_pct(age_years: Option<f64>) -> f64 {
    match age_years {
        Some(age) if age < 30.0 => 45.0,
        Some(age) if age < 50.0 => 40.0,
        Some(age) if age < 65.0 => 35.0,
        Some(_) => 30.0,
        None => 40.0,
    }
}

pub struct SleepScoreInputs<'a> {
    pub user: UserId,
    pub today: &'a SleepNight,
    pub recent_bedtimes: &'a [NaiveTime],
    pub hrv_baseline: Option<&'a PersonalBaseline>,
    pub rhr_baseline: Option<&'a PersonalBaseline>,
    pub today_daily_row: &'a DailyMetricRow,
    pub age_years: Option<f64>,
}

/// Pure function combining tonight's `SleepNight` with the trailing bedtime
/// history and HRV/RHR baselines into the published Sleep score
/// (`spec.md` §4.5).
#[must_use]
pub fn compute(inputs: &SleepScoreInputs<'_>) -> SleepScore {
    let night = inputs.today;

    let duration_subscore = clamp_0_100(100.0 - (TARGET_TOTAL_SLEEP_MIN - night.total_sleep_min).abs() / TARGET_TOTAL_SLEEP_MIN * 100.0);
    let efficiency_subscore = clamp_0_100(night.sleep_efficiency_pct);

    let structure_pct = if night.total_sleep_min > 0.0 {
        (night.deep_min + night.rem_min) / night.total_sleep_min * 100.0
    } else {
        0.0
    };
    let target = structure_target_pct(inputs.age_years);
    let structure_subscore = clamp_0_100(100.0 - (target - structure_pct).abs() / target * 100.0);

    let consistency_subscore = consistency_subscore(inputs.recent_bedtimes, night.bedtime_local);

    let recovery_subscore = {
        let mut parts = Vec::new();
        if let (Some(hrv), Some(baseline)) = (inputs.today_daily_row.hrv_ms, inputs.hrv_baseline) {
            if !baseline.insufficient_data {
                let spread = (baseline.p75 - baseline.p25).max(1.0);
                parts.push(deviation_subscore(hrv, baseline.median, spread));
            }
        }
        if let (Some(rhr), Some(baseline)) = (inputs.today_daily_row.resting_hr, inputs.rhr_baseline) {
            if !baseline.insufficient_data {
                let spread = (baseline.p75 - baseline.p25).max(1.0);
                let inverted = 2.0 * baseline.median - rhr;
                parts.push(deviation_subscore(inverted, baseline.median, spread));
            }
        }
        if parts.is_empty() {
            60.0
        } else {
            parts.iter().sum::<f64>() / parts.len() as f64
        }
    };

    let score = clamp_0_100(
        duration_subscore * DURATION_WEIGHT
            + efficiency_subscore * EFFICIENCY_WEIGHT
            + structure_subscore * STRUCTURE_WEIGHT
            + consistency_subscore * CONSISTENCY_WEIGHT
            + recovery_subscore * RECOVERY_WEIGHT,
    );

    let label = if score >= 85.0 {
        SleepLabel::Excellent
    } else if score >= 70.0 {
        SleepLabel::Good
    } else if score >= 55.0 {
        SleepLabel::Fair
    } else {
        SleepLabel::Poor
    };

    SleepScore {
        user: inputs.user,
        local_date: night.sleep_date,
        score,
        duration_subscore,
        efficiency_subscore,
        structure_subscore,
        consistency_subscore,
        recovery_subscore,
        label,
        daily_row_updated_at: inputs.today_daily_row.updated_at,
        generated_at: Utc::now(),
    }
}

/// Standard deviation of bedtime-of-day (minutes from midnight) over the
/// trailing window, mapped onto a 0-100 sub-score: tighter variance scores
/// higher.
fn consistency_subscore(recent_bedtimes: &[NaiveTime], tonight: NaiveTime) -> f64 {
    let mut minutes: Vec<f64> = recent_bedtimes.iter().map(|t| time_to_minutes(*t)).collect();
    minutes.push(time_to_minutes(tonight));
    if minutes.len() < 2 {
        return 70.0;
    }
    let mean = minutes.iter().sum::<f64>() / minutes.len() as f64;
    let variance = minutes.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / minutes.len() as f64;
    let std_dev = variance.sqrt();
    clamp_0_100(100.0 - std_dev)
}

fn time_to_minutes(t: NaiveTime) -> f64 {
    f64::from(t.num_seconds_from_midnight()) / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use vitalcore_shared::sleep::SleepNight;

    fn night(total_sleep_min: f64) -> SleepNight {
        SleepNight {
            user: UserId::random(),
            sleep_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            timezone: "UTC".to_string(),
            night_start: Utc::now(),
            final_wake: Utc::now(),
            sleep_onset: Utc::now(),
            time_in_bed_min: total_sleep_min + 30.0,
            total_sleep_min,
            sleep_efficiency_pct: 90.0,
            sleep_latency_min: 15.0,
            waso_min: 10.0,
            num_awakenings: 2,
            core_min: total_sleep_min * 0.5,
            deep_min: total_sleep_min * 0.2,
            rem_min: total_sleep_min * 0.2,
            fragmentation_index: 0.3,
            bedtime_local: NaiveTime::from_hms_opt(22, 30, 0).unwrap(),
            waketime_local: NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
            mid_sleep_time_local: NaiveTime::from_hms_opt(2, 30, 0).unwrap(),
        }
    }

    #[test]
    fn scores_near_target_duration_highly() {
        let n = night(450.0);
        let row = DailyMetricRow::empty(UserId::random(), n.sleep_date, "UTC".to_string());
        let inputs = SleepScoreInputs {
            user: n.user,
            today: &n,
            recent_bedtimes: &[NaiveTime::from_hms_opt(22, 25, 0).unwrap(), NaiveTime::from_hms_opt(22, 35, 0).unwrap()],
            hrv_baseline: None,
            rhr_baseline: None,
            today_daily_row: &row,
            age_years: Some(35.0),
        };
        let result = compute(&inputs);
        assert!(result.duration_subscore > 95.0);
        assert!(matches!(result.label, SleepLabel::Excellent | SleepLabel::Good));
    }
}
