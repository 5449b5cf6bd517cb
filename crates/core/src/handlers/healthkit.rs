use crate::daily::DailyAggregator;
use crate::handlers::AuthenticatedUser;
use crate::sleep::process_night;
use crate::{AppResult, AppState};
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use vitalcore_shared::daily::RawSample;
use vitalcore_shared::forecast::RecomputeReason;
use vitalcore_shared::sleep::{SleepIntervalSample, SleepNight};

#[derive(Debug, Deserialize)]
pub struct SamplesRequest {
    pub timezone: String,
    pub samples: Vec<RawSample>,
}

#[derive(Debug, Serialize)]
pub struct SamplesResponse {
    pub accepted: usize,
    pub duplicates: usize,
}

pub async fn ingest_samples(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<SamplesRequest>,
) -> AppResult<Json<SamplesResponse>> {
    let aggregator = DailyAggregator::new(&state.db);
    let outcome = aggregator.ingest(user, &body.timezone, &body.samples).await?;

    if !outcome.touched_dates.is_empty() {
        state
            .forecast_worker
            .queue(user, RecomputeReason::NewBodyCompositionMeasurement)
            .await
            .ok();
    }

    Ok(Json(SamplesResponse { accepted: outcome.accepted, duplicates: outcome.duplicates }))
}

#[derive(Debug, Deserialize)]
pub struct SleepRequest {
    pub sleep_date: chrono::NaiveDate,
    pub timezone: String,
    pub samples: Vec<SleepIntervalSample>,
}

pub async fn ingest_sleep(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<SleepRequest>,
) -> AppResult<Json<SleepNight>> {
    let night = process_night(
        user,
        body.sleep_date,
        &body.timezone,
        &body.samples,
        state.config.sleep_min_total_minutes,
    )?;
    state.db.upsert_sleep_night(&night).await?;
    Ok(Json(night))
}
