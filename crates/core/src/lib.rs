pub mod baselines;
pub mod catalog;
pub mod config;
pub mod daily;
pub mod db;
pub mod errors;
pub mod forecast;
pub mod handlers;
pub mod insights;
pub mod labs;
pub mod measurements;
pub mod normalize;
pub mod ratelimit;
pub mod retry;
pub mod scoring;
pub mod sleep;

#[cfg(feature = "cli")]
pub mod cli;

use crate::baselines::BaselineWorker;
use crate::catalog::{seed_snapshot, Catalog};
use crate::config::AppConfig;
use crate::db::Db;
use crate::forecast::ForecastWorker;
use crate::insights::{CorrelationScanner, InsightCache};
use crate::labs::LabUploadPipeline;
use crate::ratelimit::UserRateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;
use vitalcore_shared::vendor::{find_lab_extractor, find_llm_vendor, find_object_store, LlmVendor};

pub use errors::AppError;
pub type AppResult<T> = Result<T, AppError>;

/// Everything a request handler needs, shared behind `Arc` so cloning the
/// state into an axum `Router` is cheap.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub catalog: Arc<Catalog>,
    pub config: Arc<AppConfig>,
    pub lab_pipeline: Arc<LabUploadPipeline>,
    pub forecast_worker: Arc<ForecastWorker>,
    pub insight_cache: Arc<InsightCache>,
    pub correlation_scanner: Arc<CorrelationScanner>,
    pub llm_vendor: Arc<dyn LlmVendor>,
    pub rate_limiter: Arc<UserRateLimiter>,
    pub shutdown: Arc<Notify>,
}

/// Bootstraps the kernel: loads config, opens/migrates the database, wires
/// the vendor registry, spins up the forecast worker, and serves the HTTP
/// surface until a shutdown signal arrives.
#[allow(clippy::too_many_lines)]
pub async fn run_server() -> anyhow::Result<()> {
    info!("starting vitalcore-core v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;

    if config.admin_api_key.is_none() {
        tracing::warn!("VITALCORE_API_KEY is not set; admin-only endpoints will reject all requests");
    }

    if let Some(path_str) = config.database_url.strip_prefix("sqlite:") {
        let db_path = std::path::Path::new(path_str);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    std::fs::create_dir_all(&config.object_store_base_path)?;

    let pool = db::connect(&config.database_url).await?;
    db::init_db(&pool).await?;

    let db = Arc::new(Db::new(pool, Duration::from_secs(config.db_timeout_secs)));
    let catalog = Arc::new(Catalog::new(seed_snapshot()));
    let config = Arc::new(config);

    let extractor = find_lab_extractor(&config.lab_extractor_vendor)
        .ok_or_else(|| anyhow::anyhow!("no LabExtractor registered for vendor '{}'", config.lab_extractor_vendor))?;
    let llm_vendor = find_llm_vendor(&config.llm_vendor)
        .ok_or_else(|| anyhow::anyhow!("no LlmVendor registered for vendor '{}'", config.llm_vendor))?;
    let object_store = find_object_store(&config.object_store_vendor)
        .ok_or_else(|| anyhow::anyhow!("no ObjectStore registered for vendor '{}'", config.object_store_vendor))?;

    let lab_pipeline = Arc::new(LabUploadPipeline {
        db: db.clone(),
        catalog: catalog.clone(),
        extractor,
        object_store,
        dedup_epsilon_fraction: config.dedup_epsilon_fraction,
    });

    // Crash recovery: anything left in `processing` gets re-run (`spec.md` §4.3).
    for job_id in lab_pipeline.resume_pending_jobs().await? {
        let pipeline = lab_pipeline.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.process(job_id).await {
                tracing::warn!(job_id = %job_id, error = %e, "resumed lab upload job failed again");
            }
        });
    }

    let forecast_worker = Arc::new(ForecastWorker::new(db.clone(), config.clone()));
    let shutdown = Arc::new(Notify::new());
    {
        let worker = forecast_worker.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run(shutdown).await });
    }

    let baseline_worker = Arc::new(BaselineWorker::new(db.clone(), config.clone()));
    {
        let worker = baseline_worker.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run(shutdown).await });
    }

    let insight_cache = Arc::new(InsightCache::new(db.clone(), config.insights_cache_ttl_days));
    let correlation_scanner = Arc::new(CorrelationScanner::new(db.clone(), config.correlation_min_confidence));
    let rate_limiter = Arc::new(UserRateLimiter::per_minute(config.rate_limit_per_minute));

    let state = AppState {
        db,
        catalog,
        config: config.clone(),
        lab_pipeline,
        forecast_worker,
        insight_cache,
        correlation_scanner,
        llm_vendor,
        rate_limiter,
        shutdown: shutdown.clone(),
    };

    let app = handlers::router(state);
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "vitalcore-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    Ok(())
}

async fn shutdown_signal(notify: Arc<Notify>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };
    tokio::select! {
        () = ctrl_c => {}
        () = notify.notified() => {}
    }
    info!("shutdown signal received");
    notify.notify_waiters();
}
