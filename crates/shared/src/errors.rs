use serde::{Deserialize, Serialize};

/// Every failure mode enumerated in the error-handling design. The
/// normalisation engine and scoring engines never panic — they return one of
/// these; the lab pipeline treats the per-biomarker members as accumulable,
/// not fatal (see `vitalcore_core::labs`).
#[derive(Debug, thiserror::Error, Serialize, Deserialize, Clone)]
#[serde(tag = "type", content = "detail")]
pub enum CoreError {
    #[error("biomarker not found for name '{0}'")]
    BiomarkerNotFound(String),

    #[error("no unit conversion path from '{from}' to '{to}'")]
    UnitConversionError { from: String, to: String },

    #[error("no reference range could be selected: {0}")]
    RangeSelectionError(String),

    #[error("duplicate measurement for biomarker '{biomarker_id}' on {test_date}")]
    DuplicateMeasurement {
        biomarker_id: String,
        test_date: String,
    },

    #[error("lab extractor failed: {0}")]
    ExtractionFailure(String),

    #[error("invalid test date: {0}")]
    InvalidTestDate(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("baseline not ready for metric '{0}'")]
    BaselineNotReady(String),

    #[error("external AI vendor unavailable: {0}")]
    ExternalAiUnavailable(String),

    #[error("external store error: {0}")]
    ExternalStoreError(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Stable machine-readable discriminant, independent of the human message
    /// — useful for clients branching on `missingData`/`error.type` (see
    /// `spec.md` §7).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BiomarkerNotFound(_) => "BiomarkerNotFound",
            Self::UnitConversionError { .. } => "UnitConversionError",
            Self::RangeSelectionError(_) => "RangeSelectionError",
            Self::DuplicateMeasurement { .. } => "DuplicateMeasurement",
            Self::ExtractionFailure(_) => "ExtractionFailure",
            Self::InvalidTestDate(_) => "InvalidTestDate",
            Self::InsufficientData(_) => "InsufficientData",
            Self::BaselineNotReady(_) => "BaselineNotReady",
            Self::ExternalAiUnavailable(_) => "ExternalAIUnavailable",
            Self::ExternalStoreError(_) => "ExternalStoreError",
            Self::PermissionDenied(_) => "PermissionDenied",
            Self::NotFound(_) => "NotFound",
            Self::ValidationError(_) => "ValidationError",
        }
    }
}
