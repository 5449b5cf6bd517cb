use crate::handlers::AuthenticatedUser;
use crate::measurements::MeasurementStore;
use crate::{AppError, AppResult, AppState};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use vitalcore_shared::ids::BiomarkerId;
use vitalcore_shared::insight::{InsightCard, InsightEnvelope};

pub async fn biomarker_insight(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(biomarker_id): Path<String>,
) -> AppResult<Json<InsightEnvelope>> {
    let biomarker_id = BiomarkerId::new(biomarker_id);
    let store = MeasurementStore::new(&state.db, &state.catalog);
    let measurement = store
        .get_latest_for(user, &biomarker_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no measurements recorded for '{biomarker_id}'")))?;

    let envelope = state
        .insight_cache
        .get_or_generate(user, &biomarker_id, &measurement, state.llm_vendor.as_ref())
        .await?;
    Ok(Json(envelope))
}

#[derive(Debug, Deserialize)]
pub struct ListDailyQuery {
    #[serde(default)]
    include_dismissed: bool,
}

pub async fn list_daily(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(q): Query<ListDailyQuery>,
) -> AppResult<Json<Vec<InsightCard>>> {
    let cards = state.db.list_insight_cards(user, q.include_dismissed).await?;
    Ok(Json(cards))
}

pub async fn refresh_daily(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> AppResult<Json<Vec<InsightCard>>> {
    let cards = state.correlation_scanner.scan(user, Utc::now()).await?;
    Ok(Json(cards))
}

pub async fn dismiss_daily(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(id): Path<uuid::Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    state.db.dismiss_insight_card(id).await?;
    Ok(Json(serde_json::json!({ "status": "dismissed" })))
}
