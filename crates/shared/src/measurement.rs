use crate::biomarker::{Flag, NormalisationContext, NormalisationWarning};
use crate::ids::{BiomarkerId, MeasurementId, SessionId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementSource {
    Manual,
    AiExtracted,
    Corrected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSession {
    pub id: SessionId,
    pub user: UserId,
    pub source: MeasurementSource,
    pub test_date: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub id: MeasurementId,
    pub session: SessionId,
    pub biomarker_id: BiomarkerId,
    pub source: MeasurementSource,
    pub value_raw: f64,
    pub unit_raw: String,
    pub value_canonical: f64,
    pub unit_canonical: String,
    pub value_display: f64,
    pub reference_low: f64,
    pub reference_high: f64,
    pub flags: Vec<Flag>,
    pub warnings: Vec<NormalisationWarning>,
    pub normalization_context: NormalisationContext,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<UserId>,
}
