use crate::ids::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaselineMetric {
    RestingHr,
    Hrv,
    RespiratoryRate,
    Steps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowDays {
    Fourteen,
    TwentyEight,
    Ninety,
}

impl WindowDays {
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Fourteen => 14,
            Self::TwentyEight => 28,
            Self::Ninety => 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalBaseline {
    pub user: UserId,
    pub metric: BaselineMetric,
    pub window_days: WindowDays,
    pub median: f64,
    pub p25: f64,
    pub p75: f64,
    pub sample_count: usize,
    pub insufficient_data: bool,
    pub updated_at: DateTime<Utc>,
}
