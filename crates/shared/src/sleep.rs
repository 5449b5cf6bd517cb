use crate::ids::UserId;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SleepStage {
    InBed,
    Asleep,
    Awake,
    Core,
    Deep,
    Rem,
    Unspecified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepIntervalSample {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub stage: SleepStage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepNight {
    pub user: UserId,
    pub sleep_date: NaiveDate,
    pub timezone: String,
    pub night_start: DateTime<Utc>,
    pub final_wake: DateTime<Utc>,
    pub sleep_onset: DateTime<Utc>,
    pub time_in_bed_min: f64,
    pub total_sleep_min: f64,
    pub sleep_efficiency_pct: f64,
    pub sleep_latency_min: f64,
    pub waso_min: f64,
    pub num_awakenings: u32,
    pub core_min: f64,
    pub deep_min: f64,
    pub rem_min: f64,
    pub fragmentation_index: f64,
    pub bedtime_local: NaiveTime,
    pub waketime_local: NaiveTime,
    pub mid_sleep_time_local: NaiveTime,
}
