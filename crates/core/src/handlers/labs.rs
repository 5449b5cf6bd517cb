use crate::handlers::AuthenticatedUser;
use crate::{AppResult, AppState};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use vitalcore_shared::ids::JobId;
use vitalcore_shared::labjob::LabUploadJob;

pub async fn upload(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> AppResult<Json<LabUploadJob>> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let job = state.lab_pipeline.accept_upload(user, &body, &content_type).await?;

    let pipeline = state.lab_pipeline.clone();
    let job_id = job.id;
    tokio::spawn(async move {
        if let Err(e) = pipeline.process(job_id).await {
            tracing::warn!(job_id = %job_id, error = %e, "lab upload processing failed");
        }
    });

    Ok(Json(job))
}

pub async fn status(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(job_id): Path<uuid::Uuid>,
) -> AppResult<Json<LabUploadJob>> {
    let job = state.lab_pipeline.get_job_status(JobId::new(job_id)).await?;
    Ok(Json(job))
}
