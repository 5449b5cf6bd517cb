use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;
use vitalcore_shared::errors::{CoreError, CoreResult};
use vitalcore_shared::ids::UserId;
use vitalcore_shared::sleep::{SleepIntervalSample, SleepNight, SleepStage};

/// Merges raw sleep stage intervals into one `SleepNight` per `spec.md`
/// §4.4. Pure function: same intervals in, same night out, so it is
/// directly unit-testable without touching the database.
pub fn process_night(
    user: UserId,
    sleep_date: NaiveDate,
    timezone: &str,
    samples: &[SleepIntervalSample],
    min_total_sleep_minutes: f64,
) -> CoreResult<SleepNight> {
    if samples.is_empty() {
        return Err(CoreError::InsufficientData("no sleep samples for this night".to_string()));
    }

    let in_bed_intervals = merge_overlaps(
        samples.iter().filter(|s| s.stage != SleepStage::Awake).map(|s| (s.start, s.end)).collect(),
    );
    let time_in_bed_min = total_minutes(&in_bed_intervals);

    let asleep_stages = [SleepStage::Asleep, SleepStage::Core, SleepStage::Deep, SleepStage::Rem];
    let mut asleep_raw: Vec<(DateTime<Utc>, DateTime<Utc>)> =
        samples.iter().filter(|s| asleep_stages.contains(&s.stage)).map(|s| (s.start, s.end)).collect();
    asleep_raw.sort_by_key(|(s, _)| *s);
    let asleep_merged = merge_overlaps(asleep_raw.clone());
    let total_sleep_min = total_minutes(&asleep_merged);

    if total_sleep_min < min_total_sleep_minutes {
        return Err(CoreError::InsufficientData(format!(
            "total sleep {total_sleep_min:.0} min below the {min_total_sleep_minutes:.0} min threshold"
        )));
    }

    let core_min = stage_minutes(samples, SleepStage::Core);
    let deep_min = stage_minutes(samples, SleepStage::Deep);
    let rem_min = stage_minutes(samples, SleepStage::Rem);

    let night_start = in_bed_intervals.iter().map(|(s, _)| *s).min().unwrap();
    let final_wake = in_bed_intervals.iter().map(|(_, e)| *e).max().unwrap();
    let sleep_onset = asleep_merged.iter().map(|(s, _)| *s).min().unwrap();
    let last_asleep_end = asleep_merged.iter().map(|(_, e)| *e).max().unwrap();

    let sleep_latency_min = (sleep_onset - night_start).num_seconds().max(0) as f64 / 60.0;

    let waso_min = awake_minutes_between(samples, sleep_onset, last_asleep_end);

    let num_awakenings = count_awakenings(&asleep_merged, sleep_onset, last_asleep_end);

    let sleep_efficiency_pct = if time_in_bed_min > 0.0 {
        (total_sleep_min / time_in_bed_min * 100.0).min(100.0)
    } else {
        0.0
    };

    let fragmentation_index = if total_sleep_min > 0.0 {
        f64::from(num_awakenings) / (total_sleep_min / 60.0)
    } else {
        0.0
    };

    let tz: Tz = Tz::from_str(timezone).unwrap_or(chrono_tz::UTC);
    let bedtime_local = night_start.with_timezone(&tz).time();
    let waketime_local = final_wake.with_timezone(&tz).time();
    let mid_sleep_time_local = midpoint_time(night_start, final_wake, tz);

    Ok(SleepNight {
        user,
        sleep_date,
        timezone: timezone.to_string(),
        night_start,
        final_wake,
        sleep_onset,
        time_in_bed_min,
        total_sleep_min,
        sleep_efficiency_pct,
        sleep_latency_min,
        waso_min,
        num_awakenings,
        core_min,
        deep_min,
        rem_min,
        fragmentation_index,
        bedtime_local,
        waketime_local,
        mid_sleep_time_local,
    })
}

fn merge_overlaps(mut intervals: Vec<(DateTime<Utc>, DateTime<Utc>)>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    if intervals.is_empty() {
        return intervals;
    }
    intervals.sort_by_key(|(s, _)| *s);
    let mut merged = vec![intervals[0]];
    for (start, end) in intervals.into_iter().skip(1) {
        let last = merged.last_mut().unwrap();
        if start <= last.1 {
            if end > last.1 {
                last.1 = end;
            }
        } else {
            merged.push((start, end));
        }
    }
    merged
}

fn total_minutes(intervals: &[(DateTime<Utc>, DateTime<Utc>)]) -> f64 {
    intervals.iter().map(|(s, e)| (*e - *s).num_seconds().max(0) as f64 / 60.0).sum()
}

fn stage_minutes(samples: &[SleepIntervalSample], stage: SleepStage) -> f64 {
    let intervals: Vec<_> = samples.iter().filter(|s| s.stage == stage).map(|s| (s.start, s.end)).collect();
    total_minutes(&merge_overlaps(intervals))
}

/// Minutes spent in `Awake` between the first and last asleep interval —
/// wake-after-sleep-onset, not counting pre-sleep-onset wakefulness.
fn awake_minutes_between(samples: &[SleepIntervalSample], onset: DateTime<Utc>, last_asleep_end: DateTime<Utc>) -> f64 {
    let intervals: Vec<_> = samples
        .iter()
        .filter(|s| s.stage == SleepStage::Awake)
        .map(|s| (s.start.max(onset), s.end.min(last_asleep_end)))
        .filter(|(s, e)| s < e)
        .collect();
    total_minutes(&merge_overlaps(intervals))
}

fn count_awakenings(asleep_merged: &[(DateTime<Utc>, DateTime<Utc>)], onset: DateTime<Utc>, last_asleep_end: DateTime<Utc>) -> u32 {
    let mut count = 0u32;
    for window in asleep_merged.windows(2) {
        let (_, prev_end) = window[0];
        let (next_start, _) = window[1];
        if prev_end >= onset && next_start <= last_asleep_end && next_start > prev_end {
            count += 1;
        }
    }
    count
}

fn midpoint_time(start: DateTime<Utc>, end: DateTime<Utc>, tz: Tz) -> NaiveTime {
    let midpoint_offset = (end - start).num_seconds() / 2;
    let midpoint = start + Duration::seconds(midpoint_offset);
    midpoint.with_timezone(&tz).time()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn interval(start_min: i64, dur_min: i64, stage: SleepStage) -> SleepIntervalSample {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 22, 0, 0).unwrap();
        SleepIntervalSample {
            start: base + Duration::minutes(start_min),
            end: base + Duration::minutes(start_min + dur_min),
            stage,
        }
    }

    #[test]
    fn rejects_short_nights_as_insufficient() {
        let samples = vec![interval(0, 60, SleepStage::InBed), interval(0, 60, SleepStage::Core)];
        let result = process_night(UserId::random(), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), "UTC", &samples, 180.0);
        assert!(matches!(result, Err(CoreError::InsufficientData(_))));
    }

    #[test]
    fn computes_a_full_night() {
        let samples = vec![
            interval(0, 480, SleepStage::InBed),
            interval(0, 20, SleepStage::Awake),
            interval(20, 200, SleepStage::Core),
            interval(220, 10, SleepStage::Awake),
            interval(230, 90, SleepStage::Deep),
            interval(320, 100, SleepStage::Rem),
            interval(420, 60, SleepStage::Awake),
        ];
        let night = process_night(
            UserId::random(),
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            "UTC",
            &samples,
            180.0,
        )
        .unwrap();
        assert!((night.total_sleep_min - 390.0).abs() < 0.1);
        assert!(night.sleep_latency_min >= 19.0 && night.sleep_latency_min <= 21.0);
        assert_eq!(night.num_awakenings, 1);
    }
}
