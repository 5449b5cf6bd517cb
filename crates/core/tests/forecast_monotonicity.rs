//! Forecast monotonicity (`spec.md` §8): for a fixed `slope` and
//! `baseSigma`, `|high(d) - low(d)|` must be non-decreasing in `d` — the
//! uncertainty band only ever widens further out the horizon.

use chrono::NaiveDate;
use vitalcore_core::forecast::compute_forecast;
use vitalcore_shared::daily::DailyMetricRow;
use vitalcore_shared::ids::UserId;

fn row(user: UserId, date: NaiveDate, weight: f64) -> DailyMetricRow {
    let mut r = DailyMetricRow::empty(user, date, "UTC".to_string());
    r.weight_kg = Some(weight);
    r
}

#[test]
fn uncertainty_band_never_narrows_further_out_the_horizon() {
    let user = UserId::random();
    let today = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();

    // a noisy but roughly-linear 21-day weigh-in history so the fit has a
    // non-trivial residual std dev.
    let rows: Vec<_> = (0..21)
        .map(|i| {
            let wobble = if i % 2 == 0 { 0.15 } else { -0.1 };
            row(user, today - chrono::Duration::days(20 - i), 92.0 - i as f64 * 0.08 + wobble)
        })
        .collect();

    let outcome = compute_forecast(user, &rows, None, None, today, 42);

    let mid = outcome.series.iter().find(|s| s.metric == "weight_kg").expect("mid series present");
    let low = outcome.series.iter().find(|s| s.metric == "weight_kg_low").expect("low series present");
    let high = outcome.series.iter().find(|s| s.metric == "weight_kg_high").expect("high series present");
    assert_eq!(mid.points.len(), low.points.len());
    assert_eq!(mid.points.len(), high.points.len());

    let mut previous_width = 0.0;
    for i in 0..mid.points.len() {
        let width = high.points[i].value - low.points[i].value;
        assert!(
            width >= previous_width - 1e-9,
            "band width shrank from {previous_width} to {width} at day {i}"
        );
        previous_width = width;
    }
    assert!(previous_width > 0.0, "band should have widened at all by day 42");
}

#[test]
fn losing_goal_with_positive_slope_never_gets_an_eta() {
    // scenario 6 (`spec.md` §8): current=80, target=70 (lose), slope=+0.05 kg/day
    // must never resolve an ETA, and the status chip reads AT_RISK.
    let user = UserId::random();
    let today = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
    let rows: Vec<_> = (0..10).map(|i| row(user, today - chrono::Duration::days(9 - i), 80.0 + i as f64 * 0.05)).collect();

    let goal = vitalcore_shared::forecast::WeightGoal {
        goal_type: vitalcore_shared::forecast::WeightGoalType::Lose,
        target_weight_kg: 70.0,
        target_date: Some(today + chrono::Duration::days(180)),
        start_weight_kg: 80.0,
    };

    let outcome = compute_forecast(user, &rows, Some(&goal), None, today, 42);
    assert!(outcome.summary.eta_date.is_none());
    assert_eq!(outcome.summary.status_chip, vitalcore_shared::forecast::StatusChip::AtRisk);
}
