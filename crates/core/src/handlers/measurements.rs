use crate::handlers::AuthenticatedUser;
use crate::measurements::MeasurementStore;
use crate::{AppError, AppResult, AppState};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;
use vitalcore_shared::biomarker::{NormalisationContext, RawObservation, Sex};
use vitalcore_shared::ids::{BiomarkerId, MeasurementId};
use vitalcore_shared::measurement::{Measurement, MeasurementSource};

#[derive(Debug, Deserialize, Validate)]
pub struct MeasurementRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    pub value: f64,
    #[validate(length(min = 1, max = 32))]
    pub unit: String,
    #[validate(range(min = 0.0, max = 130.0))]
    pub age_years: Option<f64>,
    pub sex: Option<Sex>,
    pub fasting: Option<bool>,
    pub pregnancy: Option<bool>,
    pub method: Option<String>,
    pub lab_id: Option<String>,
    pub test_date: NaiveDate,
}

impl MeasurementRequest {
    fn context(&self) -> NormalisationContext {
        NormalisationContext {
            age_years: self.age_years,
            sex: self.sex,
            fasting: self.fasting,
            pregnancy: self.pregnancy,
            method: self.method.clone(),
            lab_id: self.lab_id.clone(),
        }
    }

    fn observation(&self) -> RawObservation {
        RawObservation { name: self.name.clone(), value: self.value, unit: self.unit.clone() }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    50
}

pub async fn create_measurement(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<MeasurementRequest>,
) -> AppResult<Json<Measurement>> {
    body.validate().map_err(|e| AppError::Validation(e.to_string()))?;

    let store = MeasurementStore::new(&state.db, &state.catalog);
    let session = store
        .create_session(user, MeasurementSource::Manual, body.test_date, None)
        .await?;
    let measurement = store
        .create_measurement(user, &session, &body.observation(), &body.context(), state.config.dedup_epsilon_fraction)
        .await?;

    state
        .forecast_worker
        .queue(user, vitalcore_shared::forecast::RecomputeReason::NewBodyCompositionMeasurement)
        .await
        .ok();

    Ok(Json(measurement))
}

pub async fn update_measurement(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(id): Path<uuid::Uuid>,
    Json(body): Json<MeasurementRequest>,
) -> AppResult<Json<Measurement>> {
    body.validate().map_err(|e| AppError::Validation(e.to_string()))?;

    let existing = state.db.get_measurement(MeasurementId::new(id)).await?;
    let store = MeasurementStore::new(&state.db, &state.catalog);
    let updated = store.update_measurement(&existing, &body.observation(), &body.context()).await?;
    Ok(Json(updated))
}

pub async fn delete_measurement(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(id): Path<uuid::Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let existing = state.db.get_measurement(MeasurementId::new(id)).await?;
    let store = MeasurementStore::new(&state.db, &state.catalog);
    store.delete_measurement(&existing).await?;
    Ok(Json(serde_json::json!({ "status": "deleted" })))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub biomarker_id: BiomarkerId,
    pub measurements: Vec<Measurement>,
}

pub async fn history(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(biomarker_id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> AppResult<Json<HistoryResponse>> {
    let biomarker_id = BiomarkerId::new(biomarker_id);
    let store = MeasurementStore::new(&state.db, &state.catalog);
    let measurements = store.get_history(user, &biomarker_id, q.limit).await?;
    Ok(Json(HistoryResponse { biomarker_id, measurements }))
}
