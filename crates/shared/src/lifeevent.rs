use crate::ids::UserId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse category the correlation scanner groups events by when it tests
/// whether a daily-metric swing co-occurs with something the user logged
/// (`spec.md` §4.8). Free text goes in `LifeEvent::note`, never into the
/// category itself, so the scanner's grouping stays stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifeEventType {
    Travel,
    IllnessSymptom,
    MedicationChange,
    AlcoholIntake,
    StressEvent,
    ScheduleChange,
    Other,
}

/// A user-logged occurrence on a given local date, independent of any
/// wearable/lab signal. The Correlation-driven Daily Insight Generator reads
/// these alongside `DailyMetricRow`s to explain a metric swing rather than
/// just report it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifeEvent {
    pub id: Uuid,
    pub user: UserId,
    pub event_type: LifeEventType,
    pub local_date: NaiveDate,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}
