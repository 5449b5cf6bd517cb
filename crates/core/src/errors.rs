use axum::http::StatusCode;
use axum::response::IntoResponse;
use vitalcore_shared::CoreError;

/// Wraps every error surface the HTTP shell can produce: domain errors from
/// the pipeline, infra failures that never carry user-facing detail, and the
/// handler-local not-found/validation/auth shortcuts (`spec.md` §6, §7).
pub enum AppError {
    Core(CoreError),
    Internal(anyhow::Error),
    NotFound(String),
    Validation(String),
    Unauthorized,
    Forbidden(String),
    RateLimited,
}

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> Self {
        Self::Core(e)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, err_type, message, missing_data) = match self {
            Self::Core(e) => {
                let status = match &e {
                    CoreError::PermissionDenied(_) => StatusCode::FORBIDDEN,
                    CoreError::BiomarkerNotFound(_) | CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    CoreError::DuplicateMeasurement { .. } => StatusCode::CONFLICT,
                    CoreError::InsufficientData(_) | CoreError::BaselineNotReady(_) => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    CoreError::ExternalAiUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    CoreError::UnitConversionError { .. }
                    | CoreError::RangeSelectionError(_)
                    | CoreError::ExtractionFailure(_)
                    | CoreError::InvalidTestDate(_)
                    | CoreError::ValidationError(_) => StatusCode::BAD_REQUEST,
                    CoreError::ExternalStoreError(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                let missing = matches!(e, CoreError::InsufficientData(_)).then(|| e.to_string());
                (status, e.kind().to_string(), e.to_string(), missing)
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalError".to_string(),
                    "an internal error occurred".to_string(),
                    None,
                )
            }
            Self::NotFound(m) => (StatusCode::NOT_FOUND, "NotFound".to_string(), m, None),
            Self::Validation(m) => (StatusCode::BAD_REQUEST, "ValidationError".to_string(), m, None),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized".to_string(),
                "authentication required".to_string(),
                None,
            ),
            Self::Forbidden(m) => (StatusCode::FORBIDDEN, "PermissionDenied".to_string(), m, None),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimited".to_string(),
                "too many requests, slow down".to_string(),
                None,
            ),
        };

        let mut body = serde_json::json!({
            "status": "error",
            "error": {
                "type": err_type,
                "message": message,
            }
        });
        if let Some(detail) = missing_data {
            body["error"]["missingData"] = serde_json::json!([detail]);
        }

        (status, [("Cache-Control", "no-store")], axum::Json(body)).into_response()
    }
}
