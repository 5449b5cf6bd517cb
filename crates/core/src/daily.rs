use crate::db::Db;
use chrono::{NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;
use vitalcore_shared::daily::{DailyMetricRow, RawSample, SampleReduction, SampleType};
use vitalcore_shared::errors::CoreResult;
use vitalcore_shared::forecast::{RecomputePriority, RecomputeQueueEvent, RecomputeReason};
use vitalcore_shared::ids::UserId;

pub struct DailyAggregator<'a> {
    pub db: &'a Db,
}

/// Result of ingesting one batch of raw wearable samples: which (user, date)
/// buckets actually changed, for recompute-queue fan-out.
pub struct IngestOutcome {
    pub accepted: usize,
    pub duplicates: usize,
    pub touched_dates: Vec<NaiveDate>,
}

impl<'a> DailyAggregator<'a> {
    #[must_use]
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    /// Persists each sample idempotently via its `uuid`, then re-aggregates
    /// every local date the batch touched (`spec.md` §4.4).
    pub async fn ingest(
        &self,
        user: UserId,
        timezone: &str,
        samples: &[RawSample],
    ) -> CoreResult<IngestOutcome> {
        let mut accepted = 0usize;
        let mut duplicates = 0usize;
        let mut touched = std::collections::BTreeSet::new();
        let tz = parse_timezone(timezone);

        for sample in samples {
            let local_date = sample.start.with_timezone(&tz).date_naive();
            let inserted = self.db.upsert_raw_sample(user, local_date, sample).await?;
            if inserted {
                accepted += 1;
                touched.insert(local_date);
            } else {
                duplicates += 1;
            }
        }

        for date in &touched {
            self.recompute_day(user, timezone, *date).await?;
        }

        Ok(IngestOutcome {
            accepted,
            duplicates,
            touched_dates: touched.into_iter().collect(),
        })
    }

    /// Rebuilds the `daily_metric_rows` bucket for one (user, local_date)
    /// from every raw sample on file for that day (`spec.md` §4.4 step 2-4).
    async fn recompute_day(&self, user: UserId, timezone: &str, local_date: NaiveDate) -> CoreResult<()> {
        let samples = self.db.raw_samples_for_day(user, local_date).await?;
        let existing = self.db.daily_row(user, local_date).await?;
        let tz = parse_timezone(timezone);

        let mut row = DailyMetricRow::empty(user, local_date, timezone.to_string());
        row.utc_day_start = local_date.and_hms_opt(0, 0, 0).and_then(|naive| tz.from_local_datetime(&naive).single()).map(|dt| dt.with_timezone(&Utc));
        row.utc_day_end = (local_date + chrono::Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| tz.from_local_datetime(&naive).single())
            .map(|dt| dt.with_timezone(&Utc));
        if let Some(existing) = &existing {
            row.weight_kg = existing.weight_kg;
            row.body_fat_pct = existing.body_fat_pct;
            row.bmi = existing.bmi;
            row.sleep_hours = existing.sleep_hours;
        }

        let mut by_type: HashMap<SampleType, Vec<&RawSample>> = HashMap::new();
        for s in &samples {
            by_type.entry(s.sample_type).or_default().push(s);
        }

        if let Some(steps) = by_type.get(&SampleType::Steps) {
            let mut per_source: HashMap<String, f64> = HashMap::new();
            for s in steps {
                *per_source.entry(s.source.clone()).or_insert(0.0) += s.value;
            }
            // each source's own coverage wins; total is the longest-coverage
            // source's sum, to avoid double counting overlapping wearables.
            let best_source = per_source
                .iter()
                .max_by(|a, b| {
                    let cov_a = coverage_seconds(steps, &a.0);
                    let cov_b = coverage_seconds(steps, &b.0);
                    cov_a.partial_cmp(&cov_b).unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(k, _)| k.clone());
            row.steps_total = best_source.as_ref().and_then(|s| per_source.get(s).copied());
            row.steps_sources = per_source;
        }

        if let Some(energy) = by_type.get(&SampleType::ActiveEnergyKcal) {
            row.active_energy_kcal = Some(energy.iter().map(|s| s.value).sum());
        }
        if let Some(minutes) = by_type.get(&SampleType::ExerciseMinutes) {
            row.exercise_minutes = Some(minutes.iter().map(|s| s.value).sum());
        }
        if let Some(hours) = by_type.get(&SampleType::StandHours) {
            row.stand_hours = Some(hours.iter().map(|s| s.value).sum());
        }

        for (sample_type, field) in [
            (SampleType::HeartRate, "resting_hr"),
            (SampleType::HeartRateVariability, "hrv_ms"),
            (SampleType::RespiratoryRate, "respiratory_rate"),
            (SampleType::OxygenSaturation, "oxygen_saturation_pct"),
        ] {
            if let Some(readings) = by_type.get(&sample_type) {
                debug_assert_eq!(sample_type.reduction(), SampleReduction::TimeWeightedMean);
                let value = time_weighted_mean(readings);
                match field {
                    "resting_hr" => row.resting_hr = value,
                    "hrv_ms" => row.hrv_ms = value,
                    "respiratory_rate" => row.respiratory_rate = value,
                    "oxygen_saturation_pct" => row.oxygen_saturation_pct = value,
                    _ => unreachable!(),
                }
            }
        }

        row.updated_at = Utc::now();
        self.db.upsert_daily_row(&row).await?;
        Ok(())
    }

    /// Called by the measurement store when a weight/body-composition
    /// measurement lands, to trigger a forecast recompute (`spec.md` §4.7).
    pub async fn queue_recompute(
        &self,
        user: UserId,
        local_date: NaiveDate,
        reason: RecomputeReason,
        priority: RecomputePriority,
    ) -> CoreResult<()> {
        let event = RecomputeQueueEvent {
            event_id: Uuid::new_v4(),
            user,
            reason,
            priority,
            queued_at: Utc::now(),
            requested_local_date: local_date,
        };
        self.db.enqueue_recompute(&event).await
    }
}

/// Falls back to UTC for an unrecognised IANA name, mirroring `sleep.rs`'s
/// `process_night`.
fn parse_timezone(timezone: &str) -> Tz {
    Tz::from_str(timezone).unwrap_or(chrono_tz::UTC)
}

fn coverage_seconds(samples: &[&RawSample], source: &str) -> f64 {
    samples
        .iter()
        .filter(|s| s.source == source)
        .map(|s| (s.end - s.start).num_seconds().max(0) as f64)
        .sum()
}

/// Weights each reading by the duration of its sampling window rather than
/// taking a naive mean across samples of uneven length.
fn time_weighted_mean(samples: &[&RawSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for s in samples {
        let weight = ((s.end - s.start).num_seconds().max(1)) as f64;
        weighted_sum += s.value * weight;
        weight_total += weight;
    }
    if weight_total == 0.0 {
        None
    } else {
        Some(weighted_sum / weight_total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(sample_type: SampleType, value: f64, start_offset_secs: i64, dur_secs: i64, source: &str) -> RawSample {
        let base = Utc::now();
        RawSample {
            uuid: Uuid::new_v4(),
            sample_type,
            value,
            unit: "unit".to_string(),
            start: base + Duration::seconds(start_offset_secs),
            end: base + Duration::seconds(start_offset_secs + dur_secs),
            source: source.to_string(),
        }
    }

    #[test]
    fn time_weighted_mean_favors_longer_windows() {
        let a = sample(SampleType::HeartRate, 60.0, 0, 3600, "watch");
        let b = sample(SampleType::HeartRate, 120.0, 4000, 60, "watch");
        let refs = vec![&a, &b];
        let mean = time_weighted_mean(&refs).unwrap();
        assert!(mean < 61.0, "short spike should barely move a much longer baseline window");
    }

    #[test]
    fn coverage_seconds_sums_only_matching_source() {
        let a = sample(SampleType::Steps, 500.0, 0, 1800, "phone");
        let b = sample(SampleType::Steps, 800.0, 0, 3600, "watch");
        let refs = vec![&a, &b];
        assert_eq!(coverage_seconds(&refs, "watch"), 3600.0);
        assert_eq!(coverage_seconds(&refs, "phone"), 1800.0);
    }

    /// `spec.md` §4.4: samples are bucketed by the local date of `start`,
    /// not the UTC calendar date. 23:30 Pacific on Jan 9 is still Jan 9 in
    /// `America/Los_Angeles` even though its UTC instant already reads Jan 10.
    #[test]
    fn bucket_uses_local_date_not_utc_date() {
        let tz = parse_timezone("America/Los_Angeles");
        let start_utc = Utc.with_ymd_and_hms(2026, 1, 10, 7, 30, 0).unwrap(); // 23:30 Jan 9 Pacific
        assert_eq!(start_utc.date_naive(), NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
        assert_eq!(start_utc.with_timezone(&tz).date_naive(), NaiveDate::from_ymd_opt(2026, 1, 9).unwrap());
    }

    #[test]
    fn parse_timezone_falls_back_to_utc_for_an_unknown_name() {
        assert_eq!(parse_timezone("not-a-real-zone"), chrono_tz::UTC);
    }
}
