use crate::handlers::AuthenticatedUser;
use crate::measurements::MeasurementStore;
use crate::scoring::biological_age;
use crate::{AppError, AppResult, AppState};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use vitalcore_shared::biomarker::Biomarker;
use vitalcore_shared::ids::BiomarkerId;
use vitalcore_shared::scores::BiologicalAgeEstimate;

pub async fn list_biomarkers(State(state): State<AppState>) -> Json<Vec<Biomarker>> {
    let snapshot = state.catalog.current().await;
    Json(snapshot.biomarkers.values().cloned().collect())
}

pub async fn get_biomarker(
    State(state): State<AppState>,
    Path(biomarker_id): Path<String>,
) -> AppResult<Json<Biomarker>> {
    let id = BiomarkerId::new(biomarker_id);
    let snapshot = state.catalog.current().await;
    snapshot
        .biomarkers
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no biomarker '{id}' in the reference catalog")))
}

#[derive(Debug, Deserialize)]
pub struct BiologicalAgeQuery {
    pub chronological_age_years: f64,
}

pub async fn biological_age(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(q): Query<BiologicalAgeQuery>,
) -> AppResult<Json<BiologicalAgeEstimate>> {
    let snapshot = state.catalog.current().await;
    let store = MeasurementStore::new(&state.db, &state.catalog);

    let mut latest = Vec::new();
    for biomarker_id in snapshot.biomarkers.keys() {
        if let Some(m) = store.get_latest_for(user, biomarker_id).await? {
            latest.push(m);
        }
    }

    let estimate = biological_age::compute(user, q.chronological_age_years, &snapshot, &latest)?;
    Ok(Json(estimate))
}
