use crate::forecast::simulate as run_simulation;
use crate::handlers::AuthenticatedUser;
use crate::{AppError, AppResult, AppState};
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use vitalcore_shared::forecast::{Driver, ForecastSeries, ForecastSummary, SimulatorResult};

#[derive(Debug, Serialize)]
pub struct ForecastSummaryResponse {
    pub summary: ForecastSummary,
    pub weight_series: ForecastSeries,
    pub drivers: Vec<Driver>,
}

pub async fn summary(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> AppResult<Json<ForecastSummaryResponse>> {
    let summary = state
        .db
        .get_forecast_summary(user)
        .await?
        .ok_or_else(|| AppError::NotFound("no forecast has been computed for this user yet".to_string()))?;
    let weight_series = state.db.get_forecast_series(user, "weight_kg").await?;
    let drivers = state.db.get_forecast_drivers(user).await?;
    Ok(Json(ForecastSummaryResponse { summary, weight_series, drivers }))
}

#[derive(Debug, Deserialize)]
pub struct SimulateRequest {
    pub hypothetical_daily_delta: f64,
}

pub async fn simulate(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<SimulateRequest>,
) -> AppResult<Json<SimulatorResult>> {
    let summary = state
        .db
        .get_forecast_summary(user)
        .await?
        .ok_or_else(|| AppError::NotFound("no forecast has been computed for this user yet".to_string()))?;
    let model_state = summary
        .model_state
        .ok_or_else(|| AppError::Validation("forecast model has not fit enough history to simulate from".to_string()))?;
    let current_value = summary
        .current_value
        .ok_or_else(|| AppError::Validation("no current weight value to simulate from".to_string()))?;

    let result = run_simulation(
        user,
        &model_state,
        body.hypothetical_daily_delta,
        summary.confidence,
        current_value,
        Utc::now().date_naive(),
        state.config.horizon_days,
    );
    Ok(Json(result))
}
