use crate::ids::{JobId, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    NeedsReview,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Started,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStepName {
    Uploaded,
    Extracting,
    ValidatingTestDate,
    Normalising,
    DeduplicatingAndPersisting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStep {
    pub name: JobStepName,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    pub detail: Option<String>,
}

/// One biomarker row the extractor returned that failed normalisation —
/// accumulated, never fatal to the job (`spec.md` §4.3 step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedBiomarker {
    pub raw_name: String,
    pub raw_value: f64,
    pub raw_unit: String,
    pub error: crate::errors::CoreError,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResultPayload {
    pub persisted_measurement_count: usize,
    pub failed_biomarkers: Vec<FailedBiomarker>,
    pub session_id: Option<SessionId>,
    pub lab_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabUploadJob {
    pub id: JobId,
    pub user: UserId,
    pub record_id: String,
    pub status: JobStatus,
    pub file_sha256: String,
    pub steps: Vec<JobStep>,
    pub result_payload: JobResultPayload,
    pub error_details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LabUploadJob {
    #[must_use]
    pub fn new(user: UserId, record_id: String, file_sha256: String) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::random(),
            user,
            record_id,
            status: JobStatus::Pending,
            file_sha256,
            steps: Vec::new(),
            result_payload: JobResultPayload::default(),
            error_details: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_step(&mut self, name: JobStepName, status: StepStatus, detail: Option<String>) {
        self.steps.push(JobStep {
            name,
            status,
            timestamp: Utc::now(),
            detail,
        });
        self.updated_at = Utc::now();
    }
}
