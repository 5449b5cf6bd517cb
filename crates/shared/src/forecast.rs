use crate::ids::UserId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusChip {
    NeedsData,
    AtRisk,
    OnTrack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightGoal {
    pub goal_type: WeightGoalType,
    pub target_weight_kg: f64,
    pub target_date: Option<NaiveDate>,
    pub start_weight_kg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightGoalType {
    Lose,
    Gain,
    Maintain,
}

/// One point on a projected series (weight, body fat, or any other tracked
/// quantity the Forecast Engine extrapolates; `spec.md` §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub is_projected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub metric: String,
    pub points: Vec<ForecastPoint>,
}

/// The fitted model's internal state, persisted between recomputes so a
/// recompute can warm-start instead of refitting from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    pub slope_per_day: f64,
    pub intercept: f64,
    pub residual_std_dev: f64,
    pub sample_count: usize,
    pub fitted_through: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub rank: u32,
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub confidence: ConfidenceLevel,
    pub deeplink: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub user: UserId,
    pub goal: Option<WeightGoal>,
    pub eta_date: Option<NaiveDate>,
    pub confidence: ConfidenceLevel,
    pub status_chip: StatusChip,
    pub current_value: Option<f64>,
    pub generated_at: DateTime<Utc>,
    pub model_state: Option<ModelState>,
}

/// What-if result from the Simulator: projects the ETA under a hypothetical
/// change in daily trend rather than the fitted historical one (`spec.md`
/// §4.7 "Simulator Results").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorResult {
    pub user: UserId,
    pub hypothetical_daily_delta: f64,
    pub projected_eta_date: Option<NaiveDate>,
    pub projected_series: ForecastSeries,
    pub confidence: ConfidenceLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecomputePriority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecomputeReason {
    NewWeightMeasurement,
    NewBodyCompositionMeasurement,
    GoalChanged,
    ManualRefresh,
    ScheduledRefresh,
}

/// A request to recompute one user's forecast. Queued events for the same
/// user coalesce, keeping only the highest-priority reason (`spec.md` §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecomputeQueueEvent {
    pub event_id: Uuid,
    pub user: UserId,
    pub reason: RecomputeReason,
    pub priority: RecomputePriority,
    pub queued_at: DateTime<Utc>,
    pub requested_local_date: NaiveDate,
}
