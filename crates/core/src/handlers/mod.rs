mod biomarkers;
mod forecast;
mod healthkit;
mod insights;
mod labs;
mod life_events;
mod measurements;
mod scores;

use crate::{AppError, AppState};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use vitalcore_shared::ids::UserId;

/// Auth/session/billing are external collaborators per `spec.md` §1/§6; this
/// is the seam a real deployment's session middleware plugs into. The core
/// pipeline modules never see this type — only the HTTP shell does.
pub struct AuthenticatedUser(pub UserId);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;
        let uuid = uuid::Uuid::parse_str(header).map_err(|_| AppError::Unauthorized)?;
        Ok(AuthenticatedUser(UserId::new(uuid)))
    }
}

/// Per-user token-bucket check ahead of everything else. Reads `X-User-Id`
/// itself rather than depending on `AuthenticatedUser`, since middleware
/// runs before extractors and a malformed/missing header should fall
/// through to the real auth rejection further down, not a 429.
async fn rate_limit_middleware(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, AppError> {
    let user = request
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| uuid::Uuid::parse_str(s).ok())
        .map(UserId::new);

    if let Some(user) = user {
        if !state.rate_limiter.check(user) {
            return Err(AppError::RateLimited);
        }
    }

    Ok(next.run(request).await)
}

pub(crate) fn check_admin(state: &AppState, headers: &axum::http::HeaderMap) -> Result<(), AppError> {
    match &state.config.admin_api_key {
        None => Err(AppError::Forbidden("admin API key is not configured on this deployment".to_string())),
        Some(expected) => {
            let provided = headers.get("X-API-Key").and_then(|h| h.to_str().ok());
            if provided == Some(expected.as_str()) {
                Ok(())
            } else {
                Err(AppError::Unauthorized)
            }
        }
    }
}

async fn health_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

async fn version_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn not_found_handler() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "no such route")
}

/// The thin `axum::Router` described in `spec.md` §6 — covers a
/// representative subset of each core module's entrypoint, enough to
/// exercise normalisation, the lab pipeline, scoring, forecasting and
/// insights end to end.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(state.config.cors_origins.clone()))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/biomarkers", get(biomarkers::list_biomarkers))
        .route("/biomarkers/:biomarker_id", get(biomarkers::get_biomarker))
        .route("/biological-age", get(biomarkers::biological_age))
        .route("/measurements", post(measurements::create_measurement))
        .route("/measurements/:id", patch(measurements::update_measurement))
        .route("/measurements/:id", delete(measurements::delete_measurement))
        .route("/measurements/:biomarker_id/history", get(measurements::history))
        .route("/labs/upload", post(labs::upload))
        .route("/labs/status/:job_id", get(labs::status))
        .route("/healthkit/samples", post(healthkit::ingest_samples))
        .route("/healthkit/sleep", post(healthkit::ingest_sleep))
        .route("/life-events", post(life_events::create))
        .route("/scores/readiness/today", get(scores::readiness_today))
        .route("/scores/sleep/today", get(scores::sleep_today))
        .route("/scores/momentum/today", get(scores::momentum_today))
        .route("/forecast/summary", get(forecast::summary))
        .route("/forecast/simulate", post(forecast::simulate))
        .route("/insights/biomarker/:biomarker_id", get(insights::biomarker_insight))
        .route("/insights/daily", get(insights::list_daily))
        .route("/insights/daily/refresh", post(insights::refresh_daily))
        .route("/insights/daily/:id/dismiss", post(insights::dismiss_daily))
        .fallback(not_found_handler)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(cors)
        .with_state(state)
}
