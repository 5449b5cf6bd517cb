use super::{clamp_0_100, deviation_subscore};
use chrono::Utc;
use vitalcore_shared::baseline::PersonalBaseline;
use vitalcore_shared::daily::DailyMetricRow;
use vitalcore_shared::ids::UserId;
use vitalcore_shared::scores::{MomentumFactor, MomentumScore, MomentumZone};

const TARGET_STEPS: f64 = 8000.0;
const TARGET_EXERCISE_MIN: f64 = 30.0;
const TARGET_STAND_HOURS: f64 = 12.0;

struct Weighted {
    name: &'static str,
    weight: f64,
    subscore: Option<f64>,
}

pub struct MomentumInputs<'a> {
    pub user: UserId,
    pub today: &'a DailyMetricRow,
    pub hrv_baseline: Option<&'a PersonalBaseline>,
    pub rhr_baseline: Option<&'a PersonalBaseline>,
    pub respiratory_baseline: Option<&'a PersonalBaseline>,
    pub sleep_duration_subscore: Option<f64>,
}

/// Weighted sum of up to 8 domain factors, each independently optional —
/// missing inputs simply drop out of the weighted average rather than
/// failing the whole score (`spec.md` §4.5).
#[must_use]
pub fn compute(inputs: &MomentumInputs<'_>) -> MomentumScore {
    let today = inputs.today;

    let mut factors = vec![
        Weighted {
            name: "sleep_duration",
            weight: 0.2,
            subscore: inputs.sleep_duration_subscore,
        },
        Weighted {
            name: "hrv_deviation",
            weight: 0.15,
            subscore: baseline_subscore(today.hrv_ms, inputs.hrv_baseline, false),
        },
        Weighted {
            name: "rhr_deviation",
            weight: 0.15,
            subscore: baseline_subscore(today.resting_hr, inputs.rhr_baseline, true),
        },
        Weighted {
            name: "steps_vs_target",
            weight: 0.15,
            subscore: today.steps_total.map(|v| ratio_subscore(v, TARGET_STEPS)),
        },
        Weighted {
            name: "exercise_minutes",
            weight: 0.15,
            subscore: today.exercise_minutes.map(|v| ratio_subscore(v, TARGET_EXERCISE_MIN)),
        },
        Weighted {
            name: "respiratory_rate_stability",
            weight: 0.1,
            subscore: baseline_subscore(today.respiratory_rate, inputs.respiratory_baseline, false),
        },
        Weighted {
            name: "oxygen_saturation",
            weight: 0.05,
            subscore: today.oxygen_saturation_pct.map(|v| clamp_0_100((v - 90.0) * 10.0)),
        },
        Weighted {
            name: "stand_hours",
            weight: 0.05,
            subscore: today.stand_hours.map(|v| ratio_subscore(v, TARGET_STAND_HOURS)),
        },
    ];
    factors.retain(|f| f.subscore.is_some());

    let weight_total: f64 = factors.iter().map(|f| f.weight).sum();
    let score = if weight_total > 0.0 {
        clamp_0_100(factors.iter().map(|f| f.subscore.unwrap() * f.weight).sum::<f64>() / weight_total)
    } else {
        50.0
    };

    let zone = if score >= 75.0 {
        MomentumZone::Green
    } else if score >= 50.0 {
        MomentumZone::Yellow
    } else {
        MomentumZone::Red
    };

    let daily_focus = pick_daily_focus(&factors, zone);

    MomentumScore {
        user: inputs.user,
        local_date: today.local_date,
        score,
        zone,
        factors: factors
            .into_iter()
            .map(|f| MomentumFactor {
                name: f.name.to_string(),
                subscore: f.subscore.unwrap(),
                weight: f.weight,
            })
            .collect(),
        daily_focus,
        daily_row_updated_at: today.updated_at,
        generated_at: Utc::now(),
    }
}

fn baseline_subscore(value: Option<f64>, baseline: Option<&PersonalBaseline>, lower_is_better: bool) -> Option<f64> {
    let value = value?;
    let baseline = baseline?;
    if baseline.insufficient_data {
        return None;
    }
    let spread = (baseline.p75 - baseline.p25).max(1.0);
    let effective = if lower_is_better { 2.0 * baseline.median - value } else { value };
    Some(deviation_subscore(effective, baseline.median, spread))
}

fn ratio_subscore(value: f64, target: f64) -> f64 {
    clamp_0_100(value / target * 100.0)
}

fn pick_daily_focus(factors: &[Weighted], zone: MomentumZone) -> String {
    if matches!(zone, MomentumZone::Green) {
        return "Keep up today's rhythm — your body is responding well.".to_string();
    }
    let weakest = factors.iter().min_by(|a, b| {
        a.subscore.unwrap_or(100.0).partial_cmp(&b.subscore.unwrap_or(100.0)).unwrap_or(std::cmp::Ordering::Equal)
    });
    match weakest.map(|f| f.name) {
        Some("sleep_duration") => "Prioritize getting to bed earlier tonight.".to_string(),
        Some("hrv_deviation") | Some("rhr_deviation") => "Your recovery markers are lagging — consider an easier day.".to_string(),
        Some("steps_vs_target") | Some("exercise_minutes") | Some("stand_hours") => "A short walk would help close today's activity gap.".to_string(),
        _ => "Stay consistent with today's basics.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn drops_missing_factors_without_failing() {
        let mut today = DailyMetricRow::empty(UserId::random(), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), "UTC".to_string());
        today.steps_total = Some(8000.0);
        let inputs = MomentumInputs {
            user: UserId::random(),
            today: &today,
            hrv_baseline: None,
            rhr_baseline: None,
            respiratory_baseline: None,
            sleep_duration_subscore: None,
        };
        let score = compute(&inputs);
        assert_eq!(score.factors.len(), 1);
        assert!((score.score - 100.0).abs() < 0.01);
    }

    #[test]
    fn green_zone_gives_steady_state_focus() {
        let mut today = DailyMetricRow::empty(UserId::random(), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), "UTC".to_string());
        today.steps_total = Some(9000.0);
        today.exercise_minutes = Some(35.0);
        let inputs = MomentumInputs {
            user: UserId::random(),
            today: &today,
            hrv_baseline: None,
            rhr_baseline: None,
            respiratory_baseline: None,
            sleep_duration_subscore: Some(90.0),
        };
        let score = compute(&inputs);
        assert!(matches!(score.zone, MomentumZone::Green));
        assert!(score.daily_focus.contains("rhythm"));
    }
}
