use anyhow::Context;
use axum::http::HeaderValue;
use std::env;
use std::path::PathBuf;

/// Returns the directory containing the running executable.
/// Falls back to CWD if the exe path cannot be determined.
#[must_use]
pub fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(std::path::Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Coronary-calcium severity bands consumed by the insight generator
/// (`spec.md` §9 Open Question 2: moved into config rather than hardcoded).
#[derive(Debug, Clone)]
pub struct CoronaryCalciumSeverityThresholds {
    pub minimal_max: f64,
    pub mild_max: f64,
    pub moderate_max: f64,
}

impl Default for CoronaryCalciumSeverityThresholds {
    fn default() -> Self {
        Self {
            minimal_max: 10.0,
            mild_max: 100.0,
            moderate_max: 400.0,
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub bind_address: String,
    pub cors_origins: Vec<HeaderValue>,

    /// Forecast recompute queue poll cadence.
    pub poll_interval_ms: u64,
    /// Max recompute events drained from the queue per worker cycle.
    pub batch_size: usize,
    /// Coalescing window for debouncing back-to-back recompute triggers.
    pub debounce_window_seconds: u64,
    /// Forecast projection horizon.
    pub horizon_days: u32,
    /// How long a generated insight stays fresh before regeneration is attempted.
    pub insights_cache_ttl_days: u32,
    /// Rolling window used to (re)calibrate the Readiness score baseline.
    pub readiness_calibration_days: u32,
    /// Minimum total sleep minutes for a night to count as a valid sample.
    pub sleep_min_total_minutes: f64,
    /// Fractional tolerance for duplicate-measurement detection (§9 Open Question 4).
    pub dedup_epsilon_fraction: f64,
    /// Local hour of day the Baseline Calculator recomputes.
    pub baseline_refresh_local_hour: u32,
    pub coronary_calcium_thresholds: CoronaryCalciumSeverityThresholds,
    /// Minimum `confidence_score` a correlation finding needs to be persisted
    /// as an insight card (`spec.md` §4.8, default 0.6).
    pub correlation_min_confidence: f64,
    /// Per-user token-bucket quota on the HTTP surface (`spec.md` §2 "governor
    /// token-bucket quotas per user").
    pub rate_limit_per_minute: u32,

    pub db_timeout_secs: u64,
    pub object_store_timeout_secs: u64,
    pub llm_vendor_timeout_secs: u64,

    pub lab_extractor_vendor: String,
    pub llm_vendor: String,
    pub object_store_vendor: String,
    pub llm_api_key: Option<String>,
    pub llm_api_base_url: Option<String>,
    pub object_store_base_path: String,

    pub admin_api_key: Option<String>,
}

impl AppConfig {
    #[allow(clippy::too_many_lines)]
    pub fn load() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            let db_path = exe_dir().join("data").join("vitalcore.db");
            format!("sqlite:{}", db_path.display())
        });

        let admin_api_key = env::var("VITALCORE_API_KEY").ok();
        if let Some(ref key) = admin_api_key {
            if key.len() < 32 {
                tracing::warn!("VITALCORE_API_KEY is shorter than recommended minimum (32 chars)");
            }
        }

        let port_str = env::var("PORT").unwrap_or_else(|_| "8090".to_string());
        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow::anyhow!(
                "Invalid PORT value '{}': must be an integer between 1 and 65535",
                port_str
            )
        })?;
        if port == 0 {
            anyhow::bail!("Invalid PORT value '0': must be between 1 and 65535");
        }

        let bind_address = match env::var("BIND_ADDRESS") {
            Ok(addr) => {
                addr.parse::<std::net::IpAddr>().with_context(|| {
                    format!(
                        "Invalid BIND_ADDRESS '{}': must be a valid IP address (e.g., '127.0.0.1' or '::1')",
                        addr
                    )
                })?;
                addr
            }
            Err(_) => "127.0.0.1".to_string(),
        };

        let cors_origins_str = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173,http://127.0.0.1:5173".to_string());
        let cors_origins: Vec<HeaderValue> = cors_origins_str
            .split(',')
            .filter_map(|s| {
                let trimmed = s.trim();
                if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
                    tracing::warn!(
                        "Skipping CORS origin with invalid scheme '{}': must be http:// or https://",
                        trimmed
                    );
                    return None;
                }
                match trimmed.parse::<HeaderValue>() {
                    Ok(v) => Some(v),
                    Err(e) => {
                        tracing::warn!("Skipping invalid CORS origin '{}': {}", trimmed, e);
                        None
                    }
                }
            })
            .collect();

        let poll_interval_ms = env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse::<u64>()
            .context("Failed to parse POLL_INTERVAL_MS")?;

        let batch_size = env::var("BATCH_SIZE")
            .unwrap_or_else(|_| "50".to_string())
            .parse::<usize>()
            .context("Failed to parse BATCH_SIZE")?;
        if batch_size == 0 {
            anyhow::bail!("BATCH_SIZE must be at least 1");
        }

        let debounce_window_seconds = env::var("DEBOUNCE_WINDOW_SECONDS")
            .unwrap_or_else(|_| "120".to_string())
            .parse::<u64>()
            .context("Failed to parse DEBOUNCE_WINDOW_SECONDS")?;

        let horizon_days = env::var("HORIZON_DAYS")
            .unwrap_or_else(|_| "42".to_string())
            .parse::<u32>()
            .context("Failed to parse HORIZON_DAYS")?;
        if horizon_days == 0 || horizon_days > 365 {
            anyhow::bail!("HORIZON_DAYS must be between 1 and 365 (got {})", horizon_days);
        }

        let insights_cache_ttl_days = env::var("INSIGHTS_CACHE_TTL_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u32>()
            .context("Failed to parse INSIGHTS_CACHE_TTL_DAYS")?;

        let readiness_calibration_days = env::var("READINESS_CALIBRATION_DAYS")
            .unwrap_or_else(|_| "14".to_string())
            .parse::<u32>()
            .context("Failed to parse READINESS_CALIBRATION_DAYS")?;

        let sleep_min_total_minutes = env::var("SLEEP_MIN_TOTAL_MINUTES")
            .unwrap_or_else(|_| "180".to_string())
            .parse::<f64>()
            .context("Failed to parse SLEEP_MIN_TOTAL_MINUTES")?;

        let dedup_epsilon_fraction = env::var("DEDUP_EPSILON_FRACTION")
            .unwrap_or_else(|_| "0.005".to_string())
            .parse::<f64>()
            .context("Failed to parse DEDUP_EPSILON_FRACTION")?;
        if !(0.0..1.0).contains(&dedup_epsilon_fraction) {
            anyhow::bail!(
                "DEDUP_EPSILON_FRACTION must be in [0, 1) (got {})",
                dedup_epsilon_fraction
            );
        }

        let baseline_refresh_local_hour = env::var("BASELINE_REFRESH_LOCAL_HOUR")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()
            .context("Failed to parse BASELINE_REFRESH_LOCAL_HOUR")?;
        if baseline_refresh_local_hour > 23 {
            anyhow::bail!(
                "BASELINE_REFRESH_LOCAL_HOUR must be between 0 and 23 (got {})",
                baseline_refresh_local_hour
            );
        }

        let coronary_calcium_thresholds = CoronaryCalciumSeverityThresholds {
            minimal_max: env::var("CORONARY_CALCIUM_MINIMAL_MAX")
                .unwrap_or_else(|_| "10".to_string())
                .parse::<f64>()
                .context("Failed to parse CORONARY_CALCIUM_MINIMAL_MAX")?,
            mild_max: env::var("CORONARY_CALCIUM_MILD_MAX")
                .unwrap_or_else(|_| "100".to_string())
                .parse::<f64>()
                .context("Failed to parse CORONARY_CALCIUM_MILD_MAX")?,
            moderate_max: env::var("CORONARY_CALCIUM_MODERATE_MAX")
                .unwrap_or_else(|_| "400".to_string())
                .parse::<f64>()
                .context("Failed to parse CORONARY_CALCIUM_MODERATE_MAX")?,
        };

        let correlation_min_confidence = env::var("CORRELATION_MIN_CONFIDENCE")
            .unwrap_or_else(|_| "0.6".to_string())
            .parse::<f64>()
            .context("Failed to parse CORRELATION_MIN_CONFIDENCE")?;
        if !(0.0..=1.0).contains(&correlation_min_confidence) {
            anyhow::bail!(
                "CORRELATION_MIN_CONFIDENCE must be in [0, 1] (got {})",
                correlation_min_confidence
            );
        }

        let rate_limit_per_minute = env::var("RATE_LIMIT_PER_MINUTE")
            .unwrap_or_else(|_| "120".to_string())
            .parse::<u32>()
            .context("Failed to parse RATE_LIMIT_PER_MINUTE")?;
        if rate_limit_per_minute == 0 {
            anyhow::bail!("RATE_LIMIT_PER_MINUTE must be at least 1");
        }

        let db_timeout_secs = env::var("DB_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u64>()
            .context("Failed to parse DB_TIMEOUT_SECS")?;
        let object_store_timeout_secs = env::var("OBJECT_STORE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .context("Failed to parse OBJECT_STORE_TIMEOUT_SECS")?;
        let llm_vendor_timeout_secs = env::var("LLM_VENDOR_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .context("Failed to parse LLM_VENDOR_TIMEOUT_SECS")?;

        let lab_extractor_vendor =
            env::var("LAB_EXTRACTOR_VENDOR").unwrap_or_else(|_| "mock".to_string());
        let llm_vendor = env::var("LLM_VENDOR").unwrap_or_else(|_| "openai".to_string());
        let object_store_vendor =
            env::var("OBJECT_STORE_VENDOR").unwrap_or_else(|_| "local".to_string());
        let llm_api_key = env::var("LLM_API_KEY").ok();
        let llm_api_base_url = env::var("LLM_API_BASE_URL").ok();
        let object_store_base_path = env::var("OBJECT_STORE_BASE_PATH")
            .unwrap_or_else(|_| exe_dir().join("data").join("blobs").display().to_string());

        Ok(Self {
            database_url,
            port,
            bind_address,
            cors_origins,
            poll_interval_ms,
            batch_size,
            debounce_window_seconds,
            horizon_days,
            insights_cache_ttl_days,
            readiness_calibration_days,
            sleep_min_total_minutes,
            dedup_epsilon_fraction,
            baseline_refresh_local_hour,
            coronary_calcium_thresholds,
            correlation_min_confidence,
            rate_limit_per_minute,
            db_timeout_secs,
            object_store_timeout_secs,
            llm_vendor_timeout_secs,
            lab_extractor_vendor,
            llm_vendor,
            object_store_vendor,
            llm_api_key,
            llm_api_base_url,
            object_store_base_path,
            admin_api_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvGuard(&'static str);

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            std::env::remove_var(self.0);
        }
    }

    #[test]
    fn dedup_epsilon_defaults_to_half_percent() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard("DEDUP_EPSILON_FRACTION");
        let config = AppConfig::load().unwrap();
        assert!((config.dedup_epsilon_fraction - 0.005).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_out_of_range_dedup_epsilon() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var("DEDUP_EPSILON_FRACTION", "1.5");
        let _guard = EnvGuard("DEDUP_EPSILON_FRACTION");
        assert!(AppConfig::load().is_err());
    }

    #[test]
    fn horizon_days_parses_custom_value() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var("HORIZON_DAYS", "30");
        let _guard = EnvGuard("HORIZON_DAYS");
        let config = AppConfig::load().unwrap();
        assert_eq!(config.horizon_days, 30);
    }
}
