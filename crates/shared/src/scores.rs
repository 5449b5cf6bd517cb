use crate::ids::{BiomarkerId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessBand {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessScore {
    pub user: UserId,
    pub local_date: NaiveDate,
    pub score: f64,
    pub sleep_score: f64,
    pub recovery_score: f64,
    pub load_score: f64,
    pub trend_score: f64,
    pub band: ReadinessBand,
    pub is_calibrating: bool,
    pub daily_row_updated_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SleepLabel {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepScore {
    pub user: UserId,
    pub local_date: NaiveDate,
    pub score: f64,
    pub duration_subscore: f64,
    pub efficiency_subscore: f64,
    pub structure_subscore: f64,
    pub consistency_subscore: f64,
    pub recovery_subscore: f64,
    pub label: SleepLabel,
    pub daily_row_updated_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MomentumZone {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumFactor {
    pub name: String,
    pub subscore: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumScore {
    pub user: UserId,
    pub local_date: NaiveDate,
    pub score: f64,
    pub zone: MomentumZone,
    pub factors: Vec<MomentumFactor>,
    pub daily_focus: String,
    pub daily_row_updated_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributingBiomarker {
    pub biomarker_id: BiomarkerId,
    pub z_score: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiologicalAgeEstimate {
    pub user: UserId,
    pub estimated_age_years: f64,
    pub delta_years: f64,
    pub contributing_biomarkers: Vec<ContributingBiomarker>,
    pub generated_at: DateTime<Utc>,
}
