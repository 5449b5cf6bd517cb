use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;
use vitalcore_shared::baseline::{BaselineMetric, PersonalBaseline, WindowDays};
use vitalcore_shared::biomarker::{Flag, NormalisationContext, NormalisationWarning};
use vitalcore_shared::daily::{DailyMetricRow, RawSample, SampleType};
use vitalcore_shared::errors::{CoreError, CoreResult};
use vitalcore_shared::forecast::{
    ConfidenceLevel, Driver, ForecastPoint, ForecastSeries, ForecastSummary, ModelState,
    RecomputePriority, RecomputeQueueEvent, RecomputeReason, StatusChip, WeightGoal,
};
use vitalcore_shared::ids::{BiomarkerId, JobId, MeasurementId, SessionId, UserId};
use vitalcore_shared::insight::{CachedInsight, GeneratedInsightPayload, InsightCard, InsightCategory};
use vitalcore_shared::labjob::{JobResultPayload, JobStatus, JobStep, LabUploadJob};
use vitalcore_shared::lifeevent::{LifeEvent, LifeEventType};
use vitalcore_shared::measurement::{Measurement, MeasurementSource, TestSession};
use vitalcore_shared::sleep::SleepNight;

/// Wraps every database call in a timeout so a lock contention or a disk
/// stall surfaces as a bounded error instead of hanging the caller.
pub struct Db {
    pool: SqlitePool,
    op_timeout: Duration,
}

async fn with_timeout<T>(
    op_timeout: Duration,
    fut: impl std::future::Future<Output = Result<T, sqlx::Error>>,
) -> CoreResult<T> {
    timeout(op_timeout, fut)
        .await
        .map_err(|_| CoreError::ExternalStoreError("database operation timed out".to_string()))?
        .map_err(|e| CoreError::ExternalStoreError(e.to_string()))
}

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid DATABASE_URL '{database_url}'"))?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .context("failed to open sqlite pool")
}

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    info!("running database migrations");
    const MIGRATION_TIMEOUT_SECS: u64 = 30;
    timeout(
        Duration::from_secs(MIGRATION_TIMEOUT_SECS),
        sqlx::migrate!("./migrations").run(pool),
    )
    .await
    .map_err(|_| anyhow::anyhow!("database migrations timed out after {MIGRATION_TIMEOUT_SECS}s"))?
    .context("database migration failed")?;
    Ok(())
}

fn flags_to_json(flags: &[Flag]) -> String {
    serde_json::to_string(flags).unwrap_or_else(|_| "[]".to_string())
}

fn warnings_to_json(warnings: &[NormalisationWarning]) -> String {
    serde_json::to_string(warnings).unwrap_or_else(|_| "[]".to_string())
}

impl Db {
    #[must_use]
    pub fn new(pool: SqlitePool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- test sessions -------------------------------------------------

    pub async fn insert_session(&self, session: &TestSession) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO test_sessions (id, user_id, source, test_date, notes) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(session.id.as_uuid().to_string())
            .bind(session.user.as_uuid().to_string())
            .bind(format!("{:?}", session.source))
            .bind(session.test_date.to_string())
            .bind(session.notes.clone())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    // ---- measurements ----------------------------------------------------

    pub async fn insert_measurement(&self, m: &Measurement) -> CoreResult<()> {
        let row = with_timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO measurements (
                    id, session_id, biomarker_id, source, value_raw, unit_raw,
                    value_canonical, unit_canonical, value_display,
                    reference_low, reference_high, flags_json, warnings_json,
                    normalization_context_json, created_at, updated_at, updated_by
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(m.id.as_uuid().to_string())
            .bind(m.session.as_uuid().to_string())
            .bind(m.biomarker_id.as_str())
            .bind(format!("{:?}", m.source))
            .bind(m.value_raw)
            .bind(&m.unit_raw)
            .bind(m.value_canonical)
            .bind(&m.unit_canonical)
            .bind(m.value_display)
            .bind(m.reference_low)
            .bind(m.reference_high)
            .bind(flags_to_json(&m.flags))
            .bind(warnings_to_json(&m.warnings))
            .bind(serde_json::to_string(&m.normalization_context).unwrap_or_default())
            .bind(m.created_at.to_rfc3339())
            .bind(m.updated_at.to_rfc3339())
            .bind(m.updated_by.map(|u| u.as_uuid().to_string()))
            .execute(&self.pool),
        )
        .await;

        match row {
            Ok(_) => Ok(()),
            Err(CoreError::ExternalStoreError(msg)) if msg.contains("UNIQUE") => {
                Err(CoreError::DuplicateMeasurement {
                    biomarker_id: m.biomarker_id.as_str().to_string(),
                    test_date: m.created_at.date_naive().to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn delete_measurement(&self, id: MeasurementId) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query("DELETE FROM measurements WHERE id = ?")
                .bind(id.as_uuid().to_string())
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn count_measurements_in_session(&self, session: SessionId) -> CoreResult<i64> {
        let (count,) = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM measurements WHERE session_id = ?")
                .bind(session.as_uuid().to_string())
                .fetch_one(&self.pool),
        )
        .await?;
        Ok(count)
    }

    pub async fn delete_session(&self, id: SessionId) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query("DELETE FROM test_sessions WHERE id = ?")
                .bind(id.as_uuid().to_string())
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn get_measurement(&self, id: MeasurementId) -> CoreResult<Measurement> {
        let row = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, MeasurementRow>("SELECT * FROM measurements WHERE id = ?")
                .bind(id.as_uuid().to_string())
                .fetch_optional(&self.pool),
        )
        .await?;
        row.ok_or_else(|| CoreError::NotFound(format!("measurement '{id}' not found")))?
            .into_domain()
    }

    pub async fn measurements_for_biomarker(
        &self,
        user: UserId,
        biomarker_id: &BiomarkerId,
    ) -> CoreResult<Vec<Measurement>> {
        let rows = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, MeasurementRow>(
                "SELECT m.* FROM measurements m
                 JOIN test_sessions s ON s.id = m.session_id
                 WHERE s.user_id = ? AND m.biomarker_id = ?
                 ORDER BY m.created_at ASC",
            )
            .bind(user.as_uuid().to_string())
            .bind(biomarker_id.as_str())
            .fetch_all(&self.pool),
        )
        .await?;
        Ok(rows.into_iter().filter_map(|r| r.into_domain().ok()).collect())
    }

    /// Same rows as [`Db::measurements_for_biomarker`], paired with the
    /// *session's* `test_date` rather than the measurement's `created_at` —
    /// dedup (`spec.md` §4.2, §8) keys off when the sample was drawn, not
    /// when the row was inserted.
    pub async fn measurements_with_test_date_for_biomarker(
        &self,
        user: UserId,
        biomarker_id: &BiomarkerId,
    ) -> CoreResult<Vec<(Measurement, chrono::NaiveDate)>> {
        let rows = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, MeasurementWithTestDateRow>(
                "SELECT m.*, s.test_date AS session_test_date FROM measurements m
                 JOIN test_sessions s ON s.id = m.session_id
                 WHERE s.user_id = ? AND m.biomarker_id = ?
                 ORDER BY m.created_at ASC",
            )
            .bind(user.as_uuid().to_string())
            .bind(biomarker_id.as_str())
            .fetch_all(&self.pool),
        )
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let test_date = chrono::NaiveDate::parse_from_str(&r.session_test_date, "%Y-%m-%d").ok()?;
                let measurement = r.into_measurement_row().into_domain().ok()?;
                Some((measurement, test_date))
            })
            .collect())
    }

    // ---- lab upload jobs --------------------------------------------------

    pub async fn upsert_job(&self, job: &LabUploadJob) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO lab_upload_jobs (
                    id, user_id, record_id, status, file_sha256, steps_json,
                    result_payload_json, error_details, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    steps_json = excluded.steps_json,
                    result_payload_json = excluded.result_payload_json,
                    error_details = excluded.error_details,
                    updated_at = excluded.updated_at",
            )
            .bind(job.id.as_uuid().to_string())
            .bind(job.user.as_uuid().to_string())
            .bind(&job.record_id)
            .bind(format!("{:?}", job.status))
            .bind(&job.file_sha256)
            .bind(serde_json::to_string(&job.steps).unwrap_or_default())
            .bind(serde_json::to_string(&job.result_payload).unwrap_or_default())
            .bind(&job.error_details)
            .bind(job.created_at.to_rfc3339())
            .bind(job.updated_at.to_rfc3339())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn get_job(&self, id: JobId) -> CoreResult<LabUploadJob> {
        let row = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, JobRow>("SELECT * FROM lab_upload_jobs WHERE id = ?")
                .bind(id.as_uuid().to_string())
                .fetch_optional(&self.pool),
        )
        .await?;
        row.ok_or_else(|| CoreError::NotFound(format!("job '{id}' not found")))?
            .into_domain()
    }

    pub async fn jobs_in_status(&self, status: JobStatus) -> CoreResult<Vec<LabUploadJob>> {
        let rows = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, JobRow>("SELECT * FROM lab_upload_jobs WHERE status = ?")
                .bind(format!("{status:?}"))
                .fetch_all(&self.pool),
        )
        .await?;
        rows.into_iter().map(JobRow::into_domain).collect()
    }

    // ---- daily metric rows -------------------------------------------------

    pub async fn upsert_raw_sample(&self, user: UserId, local_date: NaiveDate, s: &RawSample) -> CoreResult<bool> {
        let result = with_timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT OR IGNORE INTO raw_samples
                 (uuid, user_id, sample_type, value, unit, start_at, end_at, source, local_date)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(s.uuid.to_string())
            .bind(user.as_uuid().to_string())
            .bind(format!("{:?}", s.sample_type))
            .bind(s.value)
            .bind(&s.unit)
            .bind(s.start.to_rfc3339())
            .bind(s.end.to_rfc3339())
            .bind(&s.source)
            .bind(local_date.to_string())
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn raw_samples_for_day(
        &self,
        user: UserId,
        local_date: NaiveDate,
    ) -> CoreResult<Vec<RawSample>> {
        let rows = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, RawSampleRow>(
                "SELECT uuid, sample_type, value, unit, start_at, end_at, source
                 FROM raw_samples WHERE user_id = ? AND local_date = ?",
            )
            .bind(user.as_uuid().to_string())
            .bind(local_date.to_string())
            .fetch_all(&self.pool),
        )
        .await?;
        rows.into_iter().map(RawSampleRow::into_domain).collect()
    }

    pub async fn upsert_daily_row(&self, row: &DailyMetricRow) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO daily_metric_rows (
                    user_id, local_date, timezone, utc_day_start, utc_day_end,
                    steps_total, steps_sources_json, active_energy_kcal, sleep_hours,
                    resting_hr, hrv_ms, respiratory_rate, oxygen_saturation_pct,
                    exercise_minutes, stand_hours, weight_kg, body_fat_pct, bmi, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, local_date) DO UPDATE SET
                    timezone = excluded.timezone,
                    utc_day_start = excluded.utc_day_start,
                    utc_day_end = excluded.utc_day_end,
                    steps_total = excluded.steps_total,
                    steps_sources_json = excluded.steps_sources_json,
                    active_energy_kcal = excluded.active_energy_kcal,
                    sleep_hours = excluded.sleep_hours,
                    resting_hr = excluded.resting_hr,
                    hrv_ms = excluded.hrv_ms,
                    respiratory_rate = excluded.respiratory_rate,
                    oxygen_saturation_pct = excluded.oxygen_saturation_pct,
                    exercise_minutes = excluded.exercise_minutes,
                    stand_hours = excluded.stand_hours,
                    weight_kg = excluded.weight_kg,
                    body_fat_pct = excluded.body_fat_pct,
                    bmi = excluded.bmi,
                    updated_at = excluded.updated_at",
            )
            .bind(row.user.as_uuid().to_string())
            .bind(row.local_date.to_string())
            .bind(&row.timezone)
            .bind(row.utc_day_start.map(|d| d.to_rfc3339()))
            .bind(row.utc_day_end.map(|d| d.to_rfc3339()))
            .bind(row.steps_total)
            .bind(serde_json::to_string(&row.steps_sources).unwrap_or_default())
            .bind(row.active_energy_kcal)
            .bind(row.sleep_hours)
            .bind(row.resting_hr)
            .bind(row.hrv_ms)
            .bind(row.respiratory_rate)
            .bind(row.oxygen_saturation_pct)
            .bind(row.exercise_minutes)
            .bind(row.stand_hours)
            .bind(row.weight_kg)
            .bind(row.body_fat_pct)
            .bind(row.bmi)
            .bind(row.updated_at.to_rfc3339())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn daily_row(&self, user: UserId, local_date: NaiveDate) -> CoreResult<Option<DailyMetricRow>> {
        let row = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, DailyMetricRowDb>(
                "SELECT * FROM daily_metric_rows WHERE user_id = ? AND local_date = ?",
            )
            .bind(user.as_uuid().to_string())
            .bind(local_date.to_string())
            .fetch_optional(&self.pool),
        )
        .await?;
        row.map(DailyMetricRowDb::into_domain).transpose()
    }

    pub async fn daily_rows_in_range(
        &self,
        user: UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> CoreResult<Vec<DailyMetricRow>> {
        let rows = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, DailyMetricRowDb>(
                "SELECT * FROM daily_metric_rows WHERE user_id = ? AND local_date BETWEEN ? AND ?
                 ORDER BY local_date ASC",
            )
            .bind(user.as_uuid().to_string())
            .bind(from.to_string())
            .bind(to.to_string())
            .fetch_all(&self.pool),
        )
        .await?;
        rows.into_iter().map(DailyMetricRowDb::into_domain).collect()
    }

    /// Distinct users with at least one daily row in the window, for the
    /// nightly Baseline Calculator pass (`spec.md` §4.6) to iterate over
    /// without a separate user-directory table.
    pub async fn distinct_users_with_daily_rows_since(&self, since: NaiveDate) -> CoreResult<Vec<UserId>> {
        let rows: Vec<(String,)> = with_timeout(
            self.op_timeout,
            sqlx::query_as(
                "SELECT DISTINCT user_id FROM daily_metric_rows WHERE local_date >= ?",
            )
            .bind(since.to_string())
            .fetch_all(&self.pool),
        )
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(s,)| uuid::Uuid::parse_str(&s).ok().map(UserId::new))
            .collect())
    }

    // ---- sleep nights ----------------------------------------------------

    pub async fn upsert_sleep_night(&self, night: &SleepNight) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO sleep_nights (
                    user_id, sleep_date, timezone, night_start, final_wake, sleep_onset,
                    time_in_bed_min, total_sleep_min, sleep_efficiency_pct, sleep_latency_min,
                    waso_min, num_awakenings, core_min, deep_min, rem_min, fragmentation_index,
                    bedtime_local, waketime_local, mid_sleep_time_local
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, sleep_date) DO UPDATE SET
                    night_start = excluded.night_start,
                    final_wake = excluded.final_wake,
                    sleep_onset = excluded.sleep_onset,
                    time_in_bed_min = excluded.time_in_bed_min,
                    total_sleep_min = excluded.total_sleep_min,
                    sleep_efficiency_pct = excluded.sleep_efficiency_pct,
                    sleep_latency_min = excluded.sleep_latency_min,
                    waso_min = excluded.waso_min,
                    num_awakenings = excluded.num_awakenings,
                    core_min = excluded.core_min,
                    deep_min = excluded.deep_min,
                    rem_min = excluded.rem_min,
                    fragmentation_index = excluded.fragmentation_index,
                    bedtime_local = excluded.bedtime_local,
                    waketime_local = excluded.waketime_local,
                    mid_sleep_time_local = excluded.mid_sleep_time_local",
            )
            .bind(night.user.as_uuid().to_string())
            .bind(night.sleep_date.to_string())
            .bind(&night.timezone)
            .bind(night.night_start.to_rfc3339())
            .bind(night.final_wake.to_rfc3339())
            .bind(night.sleep_onset.to_rfc3339())
            .bind(night.time_in_bed_min)
            .bind(night.total_sleep_min)
            .bind(night.sleep_efficiency_pct)
            .bind(night.sleep_latency_min)
            .bind(night.waso_min)
            .bind(night.num_awakenings)
            .bind(night.core_min)
            .bind(night.deep_min)
            .bind(night.rem_min)
            .bind(night.fragmentation_index)
            .bind(night.bedtime_local.to_string())
            .bind(night.waketime_local.to_string())
            .bind(night.mid_sleep_time_local.to_string())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn sleep_nights_in_range(
        &self,
        user: UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> CoreResult<Vec<SleepNight>> {
        let rows = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, SleepNightDb>(
                "SELECT * FROM sleep_nights WHERE user_id = ? AND sleep_date BETWEEN ? AND ?
                 ORDER BY sleep_date ASC",
            )
            .bind(user.as_uuid().to_string())
            .bind(from.to_string())
            .bind(to.to_string())
            .fetch_all(&self.pool),
        )
        .await?;
        rows.into_iter().map(SleepNightDb::into_domain).collect()
    }

    // ---- baselines --------------------------------------------------------

    pub async fn upsert_baseline(&self, b: &PersonalBaseline) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO personal_baselines (
                    user_id, metric, window_days, median, p25, p75, sample_count,
                    insufficient_data, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, metric, window_days) DO UPDATE SET
                    median = excluded.median,
                    p25 = excluded.p25,
                    p75 = excluded.p75,
                    sample_count = excluded.sample_count,
                    insufficient_data = excluded.insufficient_data,
                    updated_at = excluded.updated_at",
            )
            .bind(b.user.as_uuid().to_string())
            .bind(format!("{:?}", b.metric))
            .bind(format!("{:?}", b.window_days))
            .bind(b.median)
            .bind(b.p25)
            .bind(b.p75)
            .bind(b.sample_count as i64)
            .bind(b.insufficient_data)
            .bind(b.updated_at.to_rfc3339())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn baseline(
        &self,
        user: UserId,
        metric: BaselineMetric,
        window: WindowDays,
    ) -> CoreResult<Option<PersonalBaseline>> {
        let row = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, BaselineDb>(
                "SELECT * FROM personal_baselines WHERE user_id = ? AND metric = ? AND window_days = ?",
            )
            .bind(user.as_uuid().to_string())
            .bind(format!("{metric:?}"))
            .bind(format!("{window:?}"))
            .fetch_optional(&self.pool),
        )
        .await?;
        row.map(BaselineDb::into_domain).transpose()
    }

    // ---- insight cache (biomarker insight, §4.8) --------------------------

    pub async fn upsert_insight_cache(
        &self,
        user: UserId,
        biomarker_id: &BiomarkerId,
        measurement_fingerprint: &str,
        cached: &CachedInsight,
    ) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO insight_cache (
                    user_id, biomarker_id, measurement_fingerprint, payload_json,
                    generated_at, expires_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, biomarker_id) DO UPDATE SET
                    measurement_fingerprint = excluded.measurement_fingerprint,
                    payload_json = excluded.payload_json,
                    generated_at = excluded.generated_at,
                    expires_at = excluded.expires_at",
            )
            .bind(user.as_uuid().to_string())
            .bind(biomarker_id.as_str())
            .bind(measurement_fingerprint)
            .bind(serde_json::to_string(&cached.payload).unwrap_or_default())
            .bind(cached.generated_at.to_rfc3339())
            .bind(cached.expires_at.to_rfc3339())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn get_insight_cache(
        &self,
        user: UserId,
        biomarker_id: &BiomarkerId,
    ) -> CoreResult<Option<(String, CachedInsight)>> {
        let row = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, InsightCacheDb>(
                "SELECT * FROM insight_cache WHERE user_id = ? AND biomarker_id = ?",
            )
            .bind(user.as_uuid().to_string())
            .bind(biomarker_id.as_str())
            .fetch_optional(&self.pool),
        )
        .await?;
        row.map(InsightCacheDb::into_domain).transpose()
    }

    // ---- insight cards (daily insight feed, §4.8) -------------------------

    pub async fn insert_insight_card(&self, card: &InsightCard) -> CoreResult<bool> {
        let result = with_timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT OR IGNORE INTO insight_cards (
                    id, user_id, category, title, body, action, target_biomarker,
                    current_value, target_value, confidence_score, pattern_signature,
                    generated_date, is_dismissed, is_new
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(card.id.to_string())
            .bind(card.user.as_uuid().to_string())
            .bind(format!("{:?}", card.category))
            .bind(&card.title)
            .bind(&card.body)
            .bind(&card.action)
            .bind(card.target_biomarker.as_ref().map(BiomarkerId::as_str))
            .bind(card.current_value)
            .bind(card.target_value)
            .bind(card.confidence_score)
            .bind(&card.pattern_signature)
            .bind(card.generated_date.to_string())
            .bind(card.is_dismissed)
            .bind(card.is_new)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_insight_cards(&self, user: UserId, include_dismissed: bool) -> CoreResult<Vec<InsightCard>> {
        let sql = if include_dismissed {
            "SELECT * FROM insight_cards WHERE user_id = ? ORDER BY generated_date DESC"
        } else {
            "SELECT * FROM insight_cards WHERE user_id = ? AND is_dismissed = 0 ORDER BY generated_date DESC"
        };
        let rows = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, InsightCardDb>(sql)
                .bind(user.as_uuid().to_string())
                .fetch_all(&self.pool),
        )
        .await?;
        rows.into_iter().map(InsightCardDb::into_domain).collect()
    }

    pub async fn dismiss_insight_card(&self, id: uuid::Uuid) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query("UPDATE insight_cards SET is_dismissed = 1 WHERE id = ?")
                .bind(id.to_string())
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    // ---- forecast -----------------------------------------------------------

    pub async fn upsert_forecast_summary(&self, summary: &ForecastSummary) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO forecast_summaries (
                    user_id, goal_json, eta_date, confidence, status_chip,
                    current_value, generated_at, model_state_json
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id) DO UPDATE SET
                    goal_json = excluded.goal_json,
                    eta_date = excluded.eta_date,
                    confidence = excluded.confidence,
                    status_chip = excluded.status_chip,
                    current_value = excluded.current_value,
                    generated_at = excluded.generated_at,
                    model_state_json = excluded.model_state_json",
            )
            .bind(summary.user.as_uuid().to_string())
            .bind(summary.goal.as_ref().map(|g| serde_json::to_string(g).unwrap_or_default()))
            .bind(summary.eta_date.map(|d| d.to_string()))
            .bind(format!("{:?}", summary.confidence))
            .bind(format!("{:?}", summary.status_chip))
            .bind(summary.current_value)
            .bind(summary.generated_at.to_rfc3339())
            .bind(
                summary
                    .model_state
                    .as_ref()
                    .map(|s| serde_json::to_string(s).unwrap_or_default()),
            )
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn get_forecast_summary(&self, user: UserId) -> CoreResult<Option<ForecastSummary>> {
        let row = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, ForecastSummaryDb>("SELECT * FROM forecast_summaries WHERE user_id = ?")
                .bind(user.as_uuid().to_string())
                .fetch_optional(&self.pool),
        )
        .await?;
        row.map(|r| r.into_domain(user)).transpose()
    }

    pub async fn replace_forecast_series(&self, user: UserId, series: &ForecastSeries) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query("DELETE FROM forecast_series_points WHERE user_id = ? AND metric = ?")
                .bind(user.as_uuid().to_string())
                .bind(&series.metric)
                .execute(&self.pool),
        )
        .await?;
        for point in &series.points {
            with_timeout(
                self.op_timeout,
                sqlx::query(
                    "INSERT INTO forecast_series_points (user_id, metric, point_date, value, is_projected)
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(user.as_uuid().to_string())
                .bind(&series.metric)
                .bind(point.date.to_string())
                .bind(point.value)
                .bind(point.is_projected)
                .execute(&self.pool),
            )
            .await?;
        }
        Ok(())
    }

    pub async fn get_forecast_series(&self, user: UserId, metric: &str) -> CoreResult<ForecastSeries> {
        let rows = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, ForecastPointDb>(
                "SELECT point_date, value, is_projected FROM forecast_series_points
                 WHERE user_id = ? AND metric = ? ORDER BY point_date ASC",
            )
            .bind(user.as_uuid().to_string())
            .bind(metric)
            .fetch_all(&self.pool),
        )
        .await?;
        Ok(ForecastSeries {
            metric: metric.to_string(),
            points: rows
                .into_iter()
                .filter_map(|r| r.into_domain().ok())
                .collect(),
        })
    }

    pub async fn replace_forecast_drivers(&self, user: UserId, drivers: &[Driver]) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query("DELETE FROM forecast_drivers WHERE user_id = ?")
                .bind(user.as_uuid().to_string())
                .execute(&self.pool),
        )
        .await?;
        for d in drivers {
            with_timeout(
                self.op_timeout,
                sqlx::query(
                    "INSERT INTO forecast_drivers (user_id, rank, driver_id, title, subtitle, confidence, deeplink)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(user.as_uuid().to_string())
                .bind(d.rank)
                .bind(&d.id)
                .bind(&d.title)
                .bind(&d.subtitle)
                .bind(format!("{:?}", d.confidence))
                .bind(&d.deeplink)
                .execute(&self.pool),
            )
            .await?;
        }
        Ok(())
    }

    pub async fn get_forecast_drivers(&self, user: UserId) -> CoreResult<Vec<Driver>> {
        let rows = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, DriverDb>(
                "SELECT rank, driver_id, title, subtitle, confidence, deeplink
                 FROM forecast_drivers WHERE user_id = ? ORDER BY rank ASC",
            )
            .bind(user.as_uuid().to_string())
            .fetch_all(&self.pool),
        )
        .await?;
        rows.into_iter().map(DriverDb::into_domain).collect()
    }

    // ---- recompute queue ----------------------------------------------------

    pub async fn enqueue_recompute(&self, event: &RecomputeQueueEvent) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO recompute_queue (event_id, user_id, reason, priority, queued_at, requested_local_date)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(event.event_id.to_string())
            .bind(event.user.as_uuid().to_string())
            .bind(format!("{:?}", event.reason))
            .bind(format!("{:?}", event.priority))
            .bind(event.queued_at.to_rfc3339())
            .bind(event.requested_local_date.to_string())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn drain_recompute_queue(&self, limit: i64) -> CoreResult<Vec<RecomputeQueueEvent>> {
        let rows = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, RecomputeQueueDb>(
                "SELECT * FROM recompute_queue ORDER BY queued_at ASC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool),
        )
        .await?;
        let events: Vec<RecomputeQueueEvent> = rows
            .into_iter()
            .filter_map(|r| r.into_domain().ok())
            .collect();
        for event in &events {
            with_timeout(
                self.op_timeout,
                sqlx::query("DELETE FROM recompute_queue WHERE event_id = ?")
                    .bind(event.event_id.to_string())
                    .execute(&self.pool),
            )
            .await?;
        }
        Ok(events)
    }

    pub async fn last_correlation_scan(&self, user: UserId) -> CoreResult<Option<DateTime<Utc>>> {
        let row = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, (String,)>(
                "SELECT last_scan_at FROM correlation_scan_state WHERE user_id = ?",
            )
            .bind(user.as_uuid().to_string())
            .fetch_optional(&self.pool),
        )
        .await?;
        row.map(|(s,)| {
            DateTime::parse_from_rfc3339(&s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| CoreError::ExternalStoreError(e.to_string()))
        })
        .transpose()
    }

    pub async fn record_correlation_scan(&self, user: UserId, at: DateTime<Utc>) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO correlation_scan_state (user_id, last_scan_at) VALUES (?, ?)
                 ON CONFLICT(user_id) DO UPDATE SET last_scan_at = excluded.last_scan_at",
            )
            .bind(user.as_uuid().to_string())
            .bind(at.to_rfc3339())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    // ---- life events (correlation-driven insights, §4.8) -----------------

    pub async fn insert_life_event(&self, event: &LifeEvent) -> CoreResult<()> {
        with_timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO life_events (id, user_id, event_type, local_date, note, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(event.id.to_string())
            .bind(event.user.as_uuid().to_string())
            .bind(format!("{:?}", event.event_type))
            .bind(event.local_date.to_string())
            .bind(&event.note)
            .bind(event.created_at.to_rfc3339())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn life_events_in_range(
        &self,
        user: UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> CoreResult<Vec<LifeEvent>> {
        let rows = with_timeout(
            self.op_timeout,
            sqlx::query_as::<_, LifeEventRow>(
                "SELECT * FROM life_events WHERE user_id = ? AND local_date BETWEEN ? AND ?
                 ORDER BY local_date ASC",
            )
            .bind(user.as_uuid().to_string())
            .bind(from.to_string())
            .bind(to.to_string())
            .fetch_all(&self.pool),
        )
        .await?;
        rows.into_iter().map(LifeEventRow::into_domain).collect()
    }
}

// ---- row <-> domain mapping -------------------------------------------------

#[derive(sqlx::FromRow)]
struct MeasurementRow {
    id: String,
    session_id: String,
    biomarker_id: String,
    source: String,
    value_raw: f64,
    unit_raw: String,
    value_canonical: f64,
    unit_canonical: String,
    value_display: f64,
    reference_low: f64,
    reference_high: f64,
    flags_json: String,
    warnings_json: String,
    normalization_context_json: String,
    created_at: String,
    updated_at: String,
    updated_by: Option<String>,
}

#[derive(sqlx::FromRow)]
struct MeasurementWithTestDateRow {
    id: String,
    session_id: String,
    biomarker_id: String,
    source: String,
    value_raw: f64,
    unit_raw: String,
    value_canonical: f64,
    unit_canonical: String,
    value_display: f64,
    reference_low: f64,
    reference_high: f64,
    flags_json: String,
    warnings_json: String,
    normalization_context_json: String,
    created_at: String,
    updated_at: String,
    updated_by: Option<String>,
    session_test_date: String,
}

impl MeasurementWithTestDateRow {
    fn into_measurement_row(self) -> MeasurementRow {
        MeasurementRow {
            id: self.id,
            session_id: self.session_id,
            biomarker_id: self.biomarker_id,
            source: self.source,
            value_raw: self.value_raw,
            unit_raw: self.unit_raw,
            value_canonical: self.value_canonical,
            unit_canonical: self.unit_canonical,
            value_display: self.value_display,
            reference_low: self.reference_low,
            reference_high: self.reference_high,
            flags_json: self.flags_json,
            warnings_json: self.warnings_json,
            normalization_context_json: self.normalization_context_json,
            created_at: self.created_at,
            updated_at: self.updated_at,
            updated_by: self.updated_by,
        }
    }
}

fn parse_source(s: &str) -> CoreResult<MeasurementSource> {
    match s {
        "Manual" => Ok(MeasurementSource::Manual),
        "AiExtracted" => Ok(MeasurementSource::AiExtracted),
        "Corrected" => Ok(MeasurementSource::Corrected),
        other => Err(CoreError::ExternalStoreError(format!("unknown measurement source '{other}'"))),
    }
}

fn parse_rfc3339(s: &str) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| CoreError::ExternalStoreError(e.to_string()))
}

fn parse_uuid(s: &str) -> CoreResult<uuid::Uuid> {
    uuid::Uuid::parse_str(s).map_err(|e| CoreError::ExternalStoreError(e.to_string()))
}

impl MeasurementRow {
    fn into_domain(self) -> CoreResult<Measurement> {
        Ok(Measurement {
            id: MeasurementId::new(parse_uuid(&self.id)?),
            session: SessionId::new(parse_uuid(&self.session_id)?),
            biomarker_id: BiomarkerId::new(self.biomarker_id),
            source: parse_source(&self.source)?,
            value_raw: self.value_raw,
            unit_raw: self.unit_raw,
            value_canonical: self.value_canonical,
            unit_canonical: self.unit_canonical,
            value_display: self.value_display,
            reference_low: self.reference_low,
            reference_high: self.reference_high,
            flags: serde_json::from_str(&self.flags_json).unwrap_or_default(),
            warnings: serde_json::from_str(&self.warnings_json).unwrap_or_default(),
            normalization_context: serde_json::from_str(&self.normalization_context_json)
                .unwrap_or_else(|_| NormalisationContext::default()),
            created_at: parse_rfc3339(&self.created_at)?,
            updated_at: parse_rfc3339(&self.updated_at)?,
            updated_by: self.updated_by.and_then(|s| uuid::Uuid::parse_str(&s).ok()).map(UserId::new),
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    user_id: String,
    record_id: String,
    status: String,
    file_sha256: String,
    steps_json: String,
    result_payload_json: String,
    error_details: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn into_domain(self) -> CoreResult<LabUploadJob> {
        let status = match self.status.as_str() {
            "Pending" => JobStatus::Pending,
            "Processing" => JobStatus::Processing,
            "Completed" => JobStatus::Completed,
            "NeedsReview" => JobStatus::NeedsReview,
            "Failed" => JobStatus::Failed,
            other => return Err(CoreError::ExternalStoreError(format!("unknown job status '{other}'"))),
        };
        Ok(LabUploadJob {
            id: JobId::new(parse_uuid(&self.id)?),
            user: UserId::new(parse_uuid(&self.user_id)?),
            record_id: self.record_id,
            status,
            file_sha256: self.file_sha256,
            steps: serde_json::from_str::<Vec<JobStep>>(&self.steps_json).unwrap_or_default(),
            result_payload: serde_json::from_str::<JobResultPayload>(&self.result_payload_json)
                .unwrap_or_default(),
            error_details: self.error_details,
            created_at: parse_rfc3339(&self.created_at)?,
            updated_at: parse_rfc3339(&self.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RawSampleRow {
    uuid: String,
    sample_type: String,
    value: f64,
    unit: String,
    start_at: String,
    end_at: String,
    source: String,
}

fn parse_sample_type(s: &str) -> CoreResult<SampleType> {
    match s {
        "Steps" => Ok(SampleType::Steps),
        "HeartRate" => Ok(SampleType::HeartRate),
        "HeartRateVariability" => Ok(SampleType::HeartRateVariability),
        "RespiratoryRate" => Ok(SampleType::RespiratoryRate),
        "OxygenSaturation" => Ok(SampleType::OxygenSaturation),
        "ExerciseMinutes" => Ok(SampleType::ExerciseMinutes),
        "StandHours" => Ok(SampleType::StandHours),
        "ActiveEnergyKcal" => Ok(SampleType::ActiveEnergyKcal),
        other => Err(CoreError::ExternalStoreError(format!("unknown sample type '{other}'"))),
    }
}

impl RawSampleRow {
    fn into_domain(self) -> CoreResult<RawSample> {
        Ok(RawSample {
            uuid: parse_uuid(&self.uuid)?,
            sample_type: parse_sample_type(&self.sample_type)?,
            value: self.value,
            unit: self.unit,
            start: parse_rfc3339(&self.start_at)?,
            end: parse_rfc3339(&self.end_at)?,
            source: self.source,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DailyMetricRowDb {
    user_id: String,
    local_date: String,
    timezone: String,
    utc_day_start: Option<String>,
    utc_day_end: Option<String>,
    steps_total: Option<f64>,
    steps_sources_json: String,
    active_energy_kcal: Option<f64>,
    sleep_hours: Option<f64>,
    resting_hr: Option<f64>,
    hrv_ms: Option<f64>,
    respiratory_rate: Option<f64>,
    oxygen_saturation_pct: Option<f64>,
    exercise_minutes: Option<f64>,
    stand_hours: Option<f64>,
    weight_kg: Option<f64>,
    body_fat_pct: Option<f64>,
    bmi: Option<f64>,
    updated_at: String,
}

impl DailyMetricRowDb {
    fn into_domain(self) -> CoreResult<DailyMetricRow> {
        Ok(DailyMetricRow {
            user: UserId::new(parse_uuid(&self.user_id)?),
            local_date: NaiveDate::parse_from_str(&self.local_date, "%Y-%m-%d")
                .map_err(|e| CoreError::ExternalStoreError(e.to_string()))?,
            timezone: self.timezone,
            utc_day_start: self.utc_day_start.map(|s| parse_rfc3339(&s)).transpose()?,
            utc_day_end: self.utc_day_end.map(|s| parse_rfc3339(&s)).transpose()?,
            steps_total: self.steps_total,
            steps_sources: serde_json::from_str(&self.steps_sources_json).unwrap_or_default(),
            active_energy_kcal: self.active_energy_kcal,
            sleep_hours: self.sleep_hours,
            resting_hr: self.resting_hr,
            hrv_ms: self.hrv_ms,
            respiratory_rate: self.respiratory_rate,
            oxygen_saturation_pct: self.oxygen_saturation_pct,
            exercise_minutes: self.exercise_minutes,
            stand_hours: self.stand_hours,
            weight_kg: self.weight_kg,
            body_fat_pct: self.body_fat_pct,
            bmi: self.bmi,
            updated_at: parse_rfc3339(&self.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SleepNightDb {
    user_id: String,
    sleep_date: String,
    timezone: String,
    night_start: String,
    final_wake: String,
    sleep_onset: String,
    time_in_bed_min: f64,
    total_sleep_min: f64,
    sleep_efficiency_pct: f64,
    sleep_latency_min: f64,
    waso_min: f64,
    num_awakenings: i64,
    core_min: f64,
    deep_min: f64,
    rem_min: f64,
    fragmentation_index: f64,
    bedtime_local: String,
    waketime_local: String,
    mid_sleep_time_local: String,
}

fn parse_time(s: &str) -> CoreResult<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| CoreError::ExternalStoreError(e.to_string()))
}

impl SleepNightDb {
    fn into_domain(self) -> CoreResult<SleepNight> {
        Ok(SleepNight {
            user: UserId::new(parse_uuid(&self.user_id)?),
            sleep_date: NaiveDate::parse_from_str(&self.sleep_date, "%Y-%m-%d")
                .map_err(|e| CoreError::ExternalStoreError(e.to_string()))?,
            timezone: self.timezone,
            night_start: parse_rfc3339(&self.night_start)?,
            final_wake: parse_rfc3339(&self.final_wake)?,
            sleep_onset: parse_rfc3339(&self.sleep_onset)?,
            time_in_bed_min: self.time_in_bed_min,
            total_sleep_min: self.total_sleep_min,
            sleep_efficiency_pct: self.sleep_efficiency_pct,
            sleep_latency_min: self.sleep_latency_min,
            waso_min: self.waso_min,
            num_awakenings: self.num_awakenings as u32,
            core_min: self.core_min,
            deep_min: self.deep_min,
            rem_min: self.rem_min,
            fragmentation_index: self.fragmentation_index,
            bedtime_local: parse_time(&self.bedtime_local)?,
            waketime_local: parse_time(&self.waketime_local)?,
            mid_sleep_time_local: parse_time(&self.mid_sleep_time_local)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BaselineDb {
    user_id: String,
    metric: String,
    window_days: String,
    median: f64,
    p25: f64,
    p75: f64,
    sample_count: i64,
    insufficient_data: bool,
    updated_at: String,
}

fn parse_baseline_metric(s: &str) -> CoreResult<BaselineMetric> {
    match s {
        "RestingHr" => Ok(BaselineMetric::RestingHr),
        "Hrv" => Ok(BaselineMetric::Hrv),
        "RespiratoryRate" => Ok(BaselineMetric::RespiratoryRate),
        "Steps" => Ok(BaselineMetric::Steps),
        other => Err(CoreError::ExternalStoreError(format!("unknown baseline metric '{other}'"))),
    }
}

fn parse_window_days(s: &str) -> CoreResult<WindowDays> {
    match s {
        "Fourteen" => Ok(WindowDays::Fourteen),
        "TwentyEight" => Ok(WindowDays::TwentyEight),
        "Ninety" => Ok(WindowDays::Ninety),
        other => Err(CoreError::ExternalStoreError(format!("unknown baseline window '{other}'"))),
    }
}

impl BaselineDb {
    fn into_domain(self) -> CoreResult<PersonalBaseline> {
        Ok(PersonalBaseline {
            user: UserId::new(parse_uuid(&self.user_id)?),
            metric: parse_baseline_metric(&self.metric)?,
            window_days: parse_window_days(&self.window_days)?,
            median: self.median,
            p25: self.p25,
            p75: self.p75,
            sample_count: self.sample_count as usize,
            insufficient_data: self.insufficient_data,
            updated_at: parse_rfc3339(&self.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InsightCacheDb {
    biomarker_id: String,
    measurement_fingerprint: String,
    payload_json: String,
    generated_at: String,
    expires_at: String,
}

impl InsightCacheDb {
    fn into_domain(self) -> CoreResult<(String, CachedInsight)> {
        let _ = self.biomarker_id;
        Ok((
            self.measurement_fingerprint,
            CachedInsight {
                payload: serde_json::from_str::<GeneratedInsightPayload>(&self.payload_json)
                    .map_err(|e| CoreError::ExternalStoreError(e.to_string()))?,
                generated_at: parse_rfc3339(&self.generated_at)?,
                expires_at: parse_rfc3339(&self.expires_at)?,
            },
        ))
    }
}

#[derive(sqlx::FromRow)]
struct InsightCardDb {
    id: String,
    user_id: String,
    category: String,
    title: String,
    body: String,
    action: Option<String>,
    target_biomarker: Option<String>,
    current_value: Option<f64>,
    target_value: Option<f64>,
    confidence_score: f64,
    pattern_signature: String,
    generated_date: String,
    is_dismissed: bool,
    is_new: bool,
}

fn parse_insight_category(s: &str) -> CoreResult<InsightCategory> {
    match s {
        "Biomarker" => Ok(InsightCategory::Biomarker),
        "Sleep" => Ok(InsightCategory::Sleep),
        "Recovery" => Ok(InsightCategory::Recovery),
        "Nutrition" => Ok(InsightCategory::Nutrition),
        "Activity" => Ok(InsightCategory::Activity),
        "Correlation" => Ok(InsightCategory::Correlation),
        other => Err(CoreError::ExternalStoreError(format!("unknown insight category '{other}'"))),
    }
}

impl InsightCardDb {
    fn into_domain(self) -> CoreResult<InsightCard> {
        Ok(InsightCard {
            id: parse_uuid(&self.id)?,
            user: UserId::new(parse_uuid(&self.user_id)?),
            category: parse_insight_category(&self.category)?,
            title: self.title,
            body: self.body,
            action: self.action,
            target_biomarker: self.target_biomarker.map(BiomarkerId::new),
            current_value: self.current_value,
            target_value: self.target_value,
            confidence_score: self.confidence_score,
            pattern_signature: self.pattern_signature,
            generated_date: NaiveDate::parse_from_str(&self.generated_date, "%Y-%m-%d")
                .map_err(|e| CoreError::ExternalStoreError(e.to_string()))?,
            is_dismissed: self.is_dismissed,
            is_new: self.is_new,
        })
    }
}

fn parse_confidence(s: &str) -> CoreResult<ConfidenceLevel> {
    match s {
        "Low" => Ok(ConfidenceLevel::Low),
        "Medium" => Ok(ConfidenceLevel::Medium),
        "High" => Ok(ConfidenceLevel::High),
        other => Err(CoreError::ExternalStoreError(format!("unknown confidence level '{other}'"))),
    }
}

fn parse_status_chip(s: &str) -> CoreResult<StatusChip> {
    match s {
        "NeedsData" => Ok(StatusChip::NeedsData),
        "AtRisk" => Ok(StatusChip::AtRisk),
        "OnTrack" => Ok(StatusChip::OnTrack),
        other => Err(CoreError::ExternalStoreError(format!("unknown status chip '{other}'"))),
    }
}

#[derive(sqlx::FromRow)]
struct ForecastSummaryDb {
    goal_json: Option<String>,
    eta_date: Option<String>,
    confidence: String,
    status_chip: String,
    current_value: Option<f64>,
    generated_at: String,
    model_state_json: Option<String>,
}

impl ForecastSummaryDb {
    fn into_domain(self, user: UserId) -> CoreResult<ForecastSummary> {
        Ok(ForecastSummary {
            user,
            goal: self
                .goal_json
                .map(|s| serde_json::from_str::<WeightGoal>(&s))
                .transpose()
                .map_err(|e| CoreError::ExternalStoreError(e.to_string()))?,
            eta_date: self
                .eta_date
                .map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
                .transpose()
                .map_err(|e| CoreError::ExternalStoreError(e.to_string()))?,
            confidence: parse_confidence(&self.confidence)?,
            status_chip: parse_status_chip(&self.status_chip)?,
            current_value: self.current_value,
            generated_at: parse_rfc3339(&self.generated_at)?,
            model_state: self
                .model_state_json
                .map(|s| serde_json::from_str::<ModelState>(&s))
                .transpose()
                .map_err(|e| CoreError::ExternalStoreError(e.to_string()))?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ForecastPointDb {
    point_date: String,
    value: f64,
    is_projected: bool,
}

impl ForecastPointDb {
    fn into_domain(self) -> CoreResult<ForecastPoint> {
        Ok(ForecastPoint {
            date: NaiveDate::parse_from_str(&self.point_date, "%Y-%m-%d")
                .map_err(|e| CoreError::ExternalStoreError(e.to_string()))?,
            value: self.value,
            is_projected: self.is_projected,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DriverDb {
    rank: i64,
    driver_id: String,
    title: String,
    subtitle: String,
    confidence: String,
    deeplink: Option<String>,
}

impl DriverDb {
    fn into_domain(self) -> CoreResult<Driver> {
        Ok(Driver {
            rank: self.rank as u32,
            id: self.driver_id,
            title: self.title,
            subtitle: self.subtitle,
            confidence: parse_confidence(&self.confidence)?,
            deeplink: self.deeplink,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RecomputeQueueDb {
    event_id: String,
    user_id: String,
    reason: String,
    priority: String,
    queued_at: String,
    requested_local_date: String,
}

fn parse_recompute_reason(s: &str) -> CoreResult<RecomputeReason> {
    match s {
        "NewWeightMeasurement" => Ok(RecomputeReason::NewWeightMeasurement),
        "NewBodyCompositionMeasurement" => Ok(RecomputeReason::NewBodyCompositionMeasurement),
        "GoalChanged" => Ok(RecomputeReason::GoalChanged),
        "ManualRefresh" => Ok(RecomputeReason::ManualRefresh),
        "ScheduledRefresh" => Ok(RecomputeReason::ScheduledRefresh),
        other => Err(CoreError::ExternalStoreError(format!("unknown recompute reason '{other}'"))),
    }
}

fn parse_recompute_priority(s: &str) -> CoreResult<RecomputePriority> {
    match s {
        "Low" => Ok(RecomputePriority::Low),
        "Normal" => Ok(RecomputePriority::Normal),
        "High" => Ok(RecomputePriority::High),
        other => Err(CoreError::ExternalStoreError(format!("unknown recompute priority '{other}'"))),
    }
}

impl RecomputeQueueDb {
    fn into_domain(self) -> CoreResult<RecomputeQueueEvent> {
        Ok(RecomputeQueueEvent {
            event_id: parse_uuid(&self.event_id)?,
            user: UserId::new(parse_uuid(&self.user_id)?),
            reason: parse_recompute_reason(&self.reason)?,
            priority: parse_recompute_priority(&self.priority)?,
            queued_at: parse_rfc3339(&self.queued_at)?,
            requested_local_date: NaiveDate::parse_from_str(&self.requested_local_date, "%Y-%m-%d")
                .map_err(|e| CoreError::ExternalStoreError(e.to_string()))?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LifeEventRow {
    id: String,
    user_id: String,
    event_type: String,
    local_date: String,
    note: Option<String>,
    created_at: String,
}

fn parse_life_event_type(s: &str) -> CoreResult<LifeEventType> {
    match s {
        "Travel" => Ok(LifeEventType::Travel),
        "IllnessSymptom" => Ok(LifeEventType::IllnessSymptom),
        "MedicationChange" => Ok(LifeEventType::MedicationChange),
        "AlcoholIntake" => Ok(LifeEventType::AlcoholIntake),
        "StressEvent" => Ok(LifeEventType::StressEvent),
        "ScheduleChange" => Ok(LifeEventType::ScheduleChange),
        "Other" => Ok(LifeEventType::Other),
        other => Err(CoreError::ExternalStoreError(format!("unknown life event type '{other}'"))),
    }
}

impl LifeEventRow {
    fn into_domain(self) -> CoreResult<LifeEvent> {
        Ok(LifeEvent {
            id: parse_uuid(&self.id)?,
            user: UserId::new(parse_uuid(&self.user_id)?),
            event_type: parse_life_event_type(&self.event_type)?,
            local_date: NaiveDate::parse_from_str(&self.local_date, "%Y-%m-%d")
                .map_err(|e| CoreError::ExternalStoreError(e.to_string()))?,
            note: self.note,
            created_at: parse_rfc3339(&self.created_at)?,
        })
    }
}
