use crate::db::Db;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};
use vitalcore_shared::biomarker::Flag;
use vitalcore_shared::daily::DailyMetricRow;
use vitalcore_shared::errors::{CoreError, CoreResult};
use vitalcore_shared::ids::{BiomarkerId, UserId};
use vitalcore_shared::insight::{
    pattern_signature, BucketedDirection, CacheStatus, GeneratedInsightPayload, InsightCacheKey,
    InsightCard, InsightCategory, InsightEnvelope,
};
use vitalcore_shared::lifeevent::{LifeEvent, LifeEventType};
use vitalcore_shared::measurement::Measurement;
use vitalcore_shared::vendor::LlmVendor;

/// Minimum spacing between two full correlation scans for the same user
/// (`spec.md` §5 "Backpressure… correlation scans are rate-limited per user,
/// ≥24 h between full scans").
const CORRELATION_SCAN_MIN_INTERVAL: ChronoDuration = ChronoDuration::hours(24);

/// Two-tier lookup in front of the LLM vendor: an in-memory hot layer so a
/// process restart is the only time every key cold-starts (`spec.md` §4.8,
/// `SPEC_FULL.md` §4.8).
pub struct InsightCache {
    db: Arc<Db>,
    hot: DashMap<InsightCacheKey, InsightEnvelope>,
    ttl_days: u32,
}

impl InsightCache {
    #[must_use]
    pub fn new(db: Arc<Db>, ttl_days: u32) -> Self {
        Self { db, hot: DashMap::new(), ttl_days }
    }

    /// Returns a cached or freshly-generated insight for `measurement`.
    ///
    /// Resolution of the stale-fallback Open Question (`spec.md` §9,
    /// restated in `SPEC_FULL.md` §9 / `DESIGN.md`): the fallback only ever
    /// serves a previous generation when the *measurement itself* is
    /// unchanged and live generation failed. A changed `value_canonical`
    /// always forces regeneration — there is no stale path for it.
    pub async fn get_or_generate(
        &self,
        user: UserId,
        biomarker_id: &BiomarkerId,
        measurement: &Measurement,
        llm: &dyn LlmVendor,
    ) -> CoreResult<InsightEnvelope> {
        let key = InsightCacheKey::new(user, biomarker_id.clone(), measurement.id.as_uuid(), measurement.value_canonical);
        let now = Utc::now();

        if let Some(entry) = self.hot.get(&key) {
            if entry.cache_status == CacheStatus::Fresh && entry.value().generated_at + chrono_days(self.ttl_days) > now {
                return Ok(entry.value().clone());
            }
        }

        let durable = self.db.get_insight_cache(user, biomarker_id).await?;
        let value_unchanged = durable
            .as_ref()
            .is_some_and(|(fingerprint, _)| *fingerprint == key.measurement_fingerprint);

        if let Some((_, cached)) = &durable {
            if value_unchanged && cached.expires_at > now {
                let envelope = InsightEnvelope {
                    payload: cached.payload.clone(),
                    cache_status: CacheStatus::Fresh,
                    generated_at: cached.generated_at,
                };
                self.hot.insert(key, envelope.clone());
                return Ok(envelope);
            }
        }

        match self.generate(measurement, llm, &now).await {
            Ok(payload) => {
                let cached = vitalcore_shared::insight::CachedInsight {
                    payload: payload.clone(),
                    generated_at: now,
                    expires_at: now + chrono_days(self.ttl_days),
                };
                self.db
                    .upsert_insight_cache(user, biomarker_id, &key.measurement_fingerprint, &cached)
                    .await?;
                let envelope = InsightEnvelope { payload, cache_status: CacheStatus::Fresh, generated_at: now };
                self.hot.insert(key, envelope.clone());
                Ok(envelope)
            }
            Err(e) => {
                if value_unchanged {
                    if let Some((_, cached)) = durable {
                        warn!(user = %user, biomarker = biomarker_id.as_str(), error = %e, "live insight generation failed, serving stale entry");
                        let envelope = InsightEnvelope {
                            payload: cached.payload,
                            cache_status: CacheStatus::Stale,
                            generated_at: cached.generated_at,
                        };
                        self.hot.insert(key, envelope.clone());
                        return Ok(envelope);
                    }
                }
                Err(e)
            }
        }
    }

    async fn generate(
        &self,
        measurement: &Measurement,
        llm: &dyn LlmVendor,
        now: &DateTime<Utc>,
    ) -> CoreResult<GeneratedInsightPayload> {
        let prompt = build_prompt(measurement);
        let raw = crate::retry::with_backoff("llm.generate_insight", || llm.generate_insight(&prompt)).await?;
        let payload = serde_json::from_str::<GeneratedInsightPayload>(&raw).map_err(|e| {
            CoreError::ExternalAiUnavailable(format!("{} returned an unparseable payload: {e}", llm.name()))
        })?;
        info!(biomarker = measurement.biomarker_id.as_str(), at = %now, "generated fresh insight");
        Ok(payload)
    }
}

fn chrono_days(days: u32) -> ChronoDuration {
    ChronoDuration::days(i64::from(days))
}

/// Builds the prompt handed to the vendor. Kept deliberately small — the
/// vendor is responsible for turning this into structured advice, the core
/// never interprets the prose itself (`spec.md` §9 "dynamic dispatch on
/// external AIs").
fn build_prompt(measurement: &Measurement) -> String {
    let flag_desc = measurement
        .flags
        .first()
        .map(describe_flag)
        .unwrap_or("within range");
    format!(
        "Biomarker {} is {} {} ({flag_desc}). Reference range {}-{}. Provide lifestyle, nutrition \
         and supplementation suggestions as JSON matching the GeneratedInsightPayload schema.",
        measurement.biomarker_id,
        measurement.value_display,
        measurement.unit_canonical,
        measurement.reference_low,
        measurement.reference_high,
    )
}

fn describe_flag(flag: &Flag) -> &'static str {
    match flag {
        Flag::Low => "low",
        Flag::High => "high",
        Flag::CriticalLow => "critically low",
        Flag::CriticalHigh => "critically high",
        Flag::Optimal => "optimal",
    }
}

/// A candidate pattern detected by [`find_correlations`], before the
/// confidence threshold and dedup have been applied.
#[derive(Debug, Clone)]
struct CorrelationFinding {
    event_type: LifeEventType,
    metric_name: &'static str,
    direction: BucketedDirection,
    mean_delta: f64,
    occurrences: usize,
    consistent_occurrences: usize,
}

impl CorrelationFinding {
    fn confidence_score(&self) -> f64 {
        if self.occurrences == 0 {
            return 0.0;
        }
        let consistency = self.consistent_occurrences as f64 / self.occurrences as f64;
        // Needs at least two occurrences to ever clear a default 0.6 threshold;
        // a single coincidence is never enough signal (`spec.md` §4.8 example:
        // "4/4 occurrences").
        let volume_bonus = ((self.occurrences.min(6) as f64) - 1.0).max(0.0) * 0.08;
        (consistency * 0.6 + volume_bonus).min(0.97)
    }
}

type MetricAccessor = fn(&DailyMetricRow) -> Option<f64>;
const TRACKED_METRICS: &[(&str, MetricAccessor)] = &[
    ("resting_hr", |r| r.resting_hr),
    ("hrv_ms", |r| r.hrv_ms),
    ("sleep_hours", |r| r.sleep_hours),
];

/// Pure correlation detector: for each life-event type present, compares the
/// tracked metrics on the day after the event against the day before, and
/// reports a finding when the direction of the swing is consistent across
/// occurrences (`spec.md` §4.8).
fn find_correlations(daily_rows: &[DailyMetricRow], life_events: &[LifeEvent]) -> Vec<CorrelationFinding> {
    let mut by_date: std::collections::HashMap<chrono::NaiveDate, &DailyMetricRow> = std::collections::HashMap::new();
    for row in daily_rows {
        by_date.insert(row.local_date, row);
    }

    let mut event_types: Vec<LifeEventType> = Vec::new();
    for e in life_events {
        if !event_types.contains(&e.event_type) {
            event_types.push(e.event_type);
        }
    }

    let mut findings = Vec::new();
    for event_type in event_types {
        for (metric_name, accessor) in TRACKED_METRICS {
            let mut deltas = Vec::new();
            for event in life_events.iter().filter(|e| e.event_type == event_type) {
                let before = by_date.get(&event.local_date.pred_opt().unwrap_or(event.local_date)).and_then(|r| accessor(r));
                let after = by_date
                    .get(&event.local_date.succ_opt().unwrap_or(event.local_date))
                    .and_then(|r| accessor(r));
                if let (Some(b), Some(a)) = (before, after) {
                    deltas.push(a - b);
                }
            }
            if deltas.len() < 2 {
                continue;
            }
            let mean_delta = deltas.iter().sum::<f64>() / deltas.len() as f64;
            let direction = if mean_delta > 0.01 {
                BucketedDirection::Increase
            } else if mean_delta < -0.01 {
                BucketedDirection::Decrease
            } else {
                BucketedDirection::NoChange
            };
            if direction == BucketedDirection::NoChange {
                continue;
            }
            let consistent = deltas
                .iter()
                .filter(|d| {
                    (direction == BucketedDirection::Increase && **d > 0.0)
                        || (direction == BucketedDirection::Decrease && **d < 0.0)
                })
                .count();
            findings.push(CorrelationFinding {
                event_type,
                metric_name,
                direction,
                mean_delta,
                occurrences: deltas.len(),
                consistent_occurrences: consistent,
            });
        }
    }
    findings
}

/// Scheduled pass over recent daily rows + life events, proposing
/// `InsightCard`s for patterns that clear the confidence threshold
/// (`spec.md` §4.8, §5). Runs at most once per `CORRELATION_SCAN_MIN_INTERVAL`
/// per user.
pub struct CorrelationScanner {
    db: Arc<Db>,
    min_confidence: f64,
    lookback_days: i64,
}

impl CorrelationScanner {
    #[must_use]
    pub fn new(db: Arc<Db>, min_confidence: f64) -> Self {
        Self { db, min_confidence, lookback_days: 14 }
    }

    pub async fn scan(&self, user: UserId, now: DateTime<Utc>) -> CoreResult<Vec<InsightCard>> {
        if let Some(last) = self.db.last_correlation_scan(user).await? {
            if now - last < CORRELATION_SCAN_MIN_INTERVAL {
                return Ok(Vec::new());
            }
        }

        let to = now.date_naive();
        let from = to - ChronoDuration::days(self.lookback_days);
        let daily_rows = self.db.daily_rows_in_range(user, from, to).await?;
        let life_events = self.db.life_events_in_range(user, from, to).await?;

        let mut cards = Vec::new();
        for finding in find_correlations(&daily_rows, &life_events) {
            let confidence_score = finding.confidence_score();
            if confidence_score < self.min_confidence {
                continue;
            }
            let discriminator = format!("{:?}:{}", finding.event_type, finding.metric_name);
            let signature = pattern_signature(InsightCategory::Correlation, None, &discriminator, finding.direction);
            let card = InsightCard {
                id: uuid::Uuid::new_v4(),
                user,
                category: InsightCategory::Correlation,
                title: format!("{} tends to {} after {:?} events", finding.metric_name, direction_verb(finding.direction), finding.event_type),
                body: format!(
                    "Across {} occurrences, {} moved by an average of {:.1} the day after a {:?} event ({}/{} consistent).",
                    finding.occurrences, finding.metric_name, finding.mean_delta, finding.event_type,
                    finding.consistent_occurrences, finding.occurrences,
                ),
                action: None,
                target_biomarker: None,
                current_value: None,
                target_value: None,
                confidence_score,
                pattern_signature: signature,
                generated_date: to,
                is_dismissed: false,
                is_new: true,
            };
            if self.db.insert_insight_card(&card).await? {
                cards.push(card);
            }
        }

        self.db.record_correlation_scan(user, now).await?;
        info!(user = %user, cards = cards.len(), "correlation scan completed");
        Ok(cards)
    }
}

fn direction_verb(direction: BucketedDirection) -> &'static str {
    match direction {
        BucketedDirection::Increase => "rise",
        BucketedDirection::Decrease => "drop",
        BucketedDirection::NoChange => "hold steady",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn user() -> UserId {
        UserId::random()
    }

    fn row(user: UserId, date: NaiveDate, resting_hr: f64) -> DailyMetricRow {
        let mut r = DailyMetricRow::empty(user, date, "UTC".to_string());
        r.resting_hr = Some(resting_hr);
        r
    }

    fn event(user: UserId, date: NaiveDate, event_type: LifeEventType) -> LifeEvent {
        LifeEvent { id: uuid::Uuid::new_v4(), user, event_type, local_date: date, note: None, created_at: Utc::now() }
    }

    #[test]
    fn finds_consistent_rhr_rise_after_alcohol_events() {
        let u = user();
        let d0 = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let d1 = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        let mut rows = Vec::new();
        rows.push(row(u, d0 - ChronoDuration::days(1), 55.0));
        rows.push(row(u, d0 + ChronoDuration::days(1), 63.0));
        rows.push(row(u, d1 - ChronoDuration::days(1), 56.0));
        rows.push(row(u, d1 + ChronoDuration::days(1), 65.0));
        let events = vec![event(u, d0, LifeEventType::AlcoholIntake), event(u, d1, LifeEventType::AlcoholIntake)];

        let findings = find_correlations(&rows, &events);
        let rhr_finding = findings.iter().find(|f| f.metric_name == "resting_hr").expect("expected a finding");
        assert_eq!(rhr_finding.direction, BucketedDirection::Increase);
        assert_eq!(rhr_finding.occurrences, 2);
        assert!(rhr_finding.confidence_score() >= 0.6);
    }

    #[test]
    fn ignores_event_types_with_a_single_occurrence() {
        let u = user();
        let d0 = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let rows = vec![row(u, d0 - ChronoDuration::days(1), 55.0), row(u, d0 + ChronoDuration::days(1), 63.0)];
        let events = vec![event(u, d0, LifeEventType::Travel)];

        assert!(find_correlations(&rows, &events).is_empty());
    }

    /// Two distinct correlation findings (different event type, same
    /// direction) must never collide on `pattern_signature`, or the
    /// `UNIQUE(user_id, pattern_signature)` upsert silently drops one.
    #[test]
    fn distinct_findings_get_distinct_signatures() {
        let sig_a = pattern_signature(InsightCategory::Correlation, None, "AlcoholIntake:resting_hr", BucketedDirection::Increase);
        let sig_b = pattern_signature(InsightCategory::Correlation, None, "Travel:resting_hr", BucketedDirection::Increase);
        let sig_c = pattern_signature(InsightCategory::Correlation, None, "AlcoholIntake:hrv_ms", BucketedDirection::Increase);
        assert_ne!(sig_a, sig_b);
        assert_ne!(sig_a, sig_c);
        assert_ne!(sig_b, sig_c);
    }
}
