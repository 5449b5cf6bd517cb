use crate::handlers::AuthenticatedUser;
use crate::{AppResult, AppState};
use axum::extract::State;
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;
use vitalcore_shared::lifeevent::{LifeEvent, LifeEventType};

#[derive(Debug, Deserialize)]
pub struct LifeEventRequest {
    pub event_type: LifeEventType,
    pub local_date: NaiveDate,
    pub note: Option<String>,
}

/// Logs an occurrence the Correlation-driven Daily Insight Generator can
/// later test a metric swing against (`spec.md` §4.8).
pub async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<LifeEventRequest>,
) -> AppResult<Json<LifeEvent>> {
    let event = LifeEvent {
        id: Uuid::new_v4(),
        user,
        event_type: body.event_type,
        local_date: body.local_date,
        note: body.note,
        created_at: Utc::now(),
    };
    state.db.insert_life_event(&event).await?;
    Ok(Json(event))
}
