use crate::ids::UserId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Concrete wearable sample types the Daily Aggregator and downstream scorers
/// read by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    Steps,
    HeartRate,
    HeartRateVariability,
    RespiratoryRate,
    OxygenSaturation,
    ExerciseMinutes,
    StandHours,
    ActiveEnergyKcal,
}

impl SampleType {
    /// How raw samples of this type are reduced into a single daily value.
    #[must_use]
    pub fn reduction(&self) -> SampleReduction {
        match self {
            Self::Steps | Self::ExerciseMinutes | Self::ActiveEnergyKcal | Self::StandHours => {
                SampleReduction::Sum
            }
            Self::HeartRate
            | Self::HeartRateVariability
            | Self::RespiratoryRate
            | Self::OxygenSaturation => SampleReduction::TimeWeightedMean,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleReduction {
    Sum,
    TimeWeightedMean,
}

/// A raw wearable sample as received from the device-sync surface.
/// `uuid` is the idempotency key: re-sending a batch must not double-count
/// (`spec.md` §4.4, §5, §8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSample {
    pub uuid: uuid::Uuid,
    pub sample_type: SampleType,
    pub value: f64,
    pub unit: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyMetricRow {
    pub user: UserId,
    pub local_date: NaiveDate,
    pub timezone: String,
    pub utc_day_start: Option<DateTime<Utc>>,
    pub utc_day_end: Option<DateTime<Utc>>,
    pub steps_total: Option<f64>,
    /// Per-source step totals, kept for auditability (`spec.md` §4.4).
    pub steps_sources: HashMap<String, f64>,
    pub active_energy_kcal: Option<f64>,
    pub sleep_hours: Option<f64>,
    pub resting_hr: Option<f64>,
    pub hrv_ms: Option<f64>,
    pub respiratory_rate: Option<f64>,
    pub oxygen_saturation_pct: Option<f64>,
    pub exercise_minutes: Option<f64>,
    pub stand_hours: Option<f64>,
    pub weight_kg: Option<f64>,
    pub body_fat_pct: Option<f64>,
    pub bmi: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl DailyMetricRow {
    #[must_use]
    pub fn empty(user: UserId, local_date: NaiveDate, timezone: String) -> Self {
        Self {
            user,
            local_date,
            timezone,
            utc_day_start: None,
            utc_day_end: None,
            steps_total: None,
            steps_sources: HashMap::new(),
            active_energy_kcal: None,
            sleep_hours: None,
            resting_hr: None,
            hrv_ms: None,
            respiratory_rate: None,
            oxygen_saturation_pct: None,
            exercise_minutes: None,
            stand_hours: None,
            weight_kg: None,
            body_fat_pct: None,
            bmi: None,
            updated_at: Utc::now(),
        }
    }
}
