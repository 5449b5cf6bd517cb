use crate::catalog::Catalog;
use crate::db::Db;
use crate::normalize::normalise;
use chrono::Utc;
use vitalcore_shared::biomarker::{NormalisationContext, RawObservation};
use vitalcore_shared::errors::{CoreError, CoreResult};
use vitalcore_shared::ids::{BiomarkerId, MeasurementId, SessionId, UserId};
use vitalcore_shared::measurement::{Measurement, MeasurementSource, TestSession};

/// `|Δ| < epsilon_fraction` of the existing value counts as the same
/// observation re-submitted, per `spec.md` §4.2. `epsilon_fraction` is read
/// once from `AppConfig` and threaded through explicitly (§9 Open Question 4).
#[must_use]
pub fn is_duplicate(existing_value: f64, candidate_value: f64, epsilon_fraction: f64) -> bool {
    if existing_value == 0.0 {
        return candidate_value == 0.0;
    }
    ((candidate_value - existing_value) / existing_value).abs() < epsilon_fraction
}

pub struct MeasurementStore<'a> {
    pub db: &'a Db,
    pub catalog: &'a Catalog,
}

impl<'a> MeasurementStore<'a> {
    #[must_use]
    pub fn new(db: &'a Db, catalog: &'a Catalog) -> Self {
        Self { db, catalog }
    }

    pub async fn create_session(
        &self,
        user: UserId,
        source: MeasurementSource,
        test_date: chrono::NaiveDate,
        notes: Option<String>,
    ) -> CoreResult<TestSession> {
        let session = TestSession {
            id: SessionId::random(),
            user,
            source,
            test_date,
            notes,
        };
        self.db.insert_session(&session).await?;
        Ok(session)
    }

    /// Normalises `input`, checks historical duplication, and persists a new
    /// `Measurement` under `session`. Returns `DuplicateMeasurement` without
    /// writing if an equivalent observation already exists for this user
    /// within `epsilon_fraction` (`spec.md` §4.2).
    pub async fn create_measurement(
        &self,
        user: UserId,
        session: &TestSession,
        input: &RawObservation,
        context: &NormalisationContext,
        epsilon_fraction: f64,
    ) -> CoreResult<Measurement> {
        let snapshot = self.catalog.current().await;
        let normalised = normalise(&snapshot, input, context)?;

        let history = self
            .db
            .measurements_with_test_date_for_biomarker(user, &normalised.biomarker_id)
            .await?;
        for (existing, existing_test_date) in &history {
            if *existing_test_date == session.test_date
                && is_duplicate(existing.value_canonical, normalised.value_canonical, epsilon_fraction)
            {
                return Err(CoreError::DuplicateMeasurement {
                    biomarker_id: normalised.biomarker_id.as_str().to_string(),
                    test_date: session.test_date.to_string(),
                });
            }
        }

        let now = Utc::now();
        let measurement = Measurement {
            id: MeasurementId::random(),
            session: session.id,
            biomarker_id: normalised.biomarker_id,
            source: session.source,
            value_raw: input.value,
            unit_raw: input.unit.clone(),
            value_canonical: normalised.value_canonical,
            unit_canonical: normalised.unit_canonical,
            value_display: normalised.value_display,
            reference_low: normalised.selected_range.low,
            reference_high: normalised.selected_range.high,
            flags: normalised.flags,
            warnings: normalised.warnings,
            normalization_context: normalised.context_used,
            created_at: now,
            updated_at: now,
            updated_by: None,
        };

        self.db.insert_measurement(&measurement).await?;
        Ok(measurement)
    }

    pub async fn get_history(
        &self,
        user: UserId,
        biomarker_id: &BiomarkerId,
        limit: usize,
    ) -> CoreResult<Vec<Measurement>> {
        let mut history = self.db.measurements_for_biomarker(user, biomarker_id).await?;
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        history.truncate(limit);
        Ok(history)
    }

    pub async fn get_latest_for(&self, user: UserId, biomarker_id: &BiomarkerId) -> CoreResult<Option<Measurement>> {
        Ok(self.get_history(user, biomarker_id, 1).await?.into_iter().next())
    }

    /// Re-invokes normalisation against the edited raw input. A measurement
    /// that started as `ai_extracted` transitions to `corrected`, per
    /// `spec.md` §4.2 "Editing a measurement re-invokes §4.1".
    pub async fn update_measurement(
        &self,
        existing: &Measurement,
        input: &RawObservation,
        context: &NormalisationContext,
    ) -> CoreResult<Measurement> {
        let snapshot = self.catalog.current().await;
        let normalised = normalise(&snapshot, input, context)?;

        let source = if existing.source == MeasurementSource::AiExtracted {
            MeasurementSource::Corrected
        } else {
            existing.source
        };

        let updated = Measurement {
            id: existing.id,
            session: existing.session,
            biomarker_id: normalised.biomarker_id,
            source,
            value_raw: input.value,
            unit_raw: input.unit.clone(),
            value_canonical: normalised.value_canonical,
            unit_canonical: normalised.unit_canonical,
            value_display: normalised.value_display,
            reference_low: normalised.selected_range.low,
            reference_high: normalised.selected_range.high,
            flags: normalised.flags,
            warnings: normalised.warnings,
            normalization_context: normalised.context_used,
            created_at: existing.created_at,
            updated_at: Utc::now(),
            updated_by: existing.updated_by,
        };

        self.db.delete_measurement(existing.id).await?;
        self.db.insert_measurement(&updated).await?;
        Ok(updated)
    }

    /// Deletes a measurement; if it was the last one in its session, the
    /// session is deleted too (`spec.md` §4.2).
    pub async fn delete_measurement(&self, measurement: &Measurement) -> CoreResult<()> {
        self.db.delete_measurement(measurement.id).await?;
        let remaining = self.db.count_measurements_in_session(measurement.session).await?;
        if remaining == 0 {
            self.db.delete_session(measurement.session).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_epsilon_counts_as_duplicate() {
        assert!(is_duplicate(100.0, 100.4, 0.005));
    }

    #[test]
    fn outside_epsilon_is_not_duplicate() {
        assert!(!is_duplicate(100.0, 101.0, 0.005));
    }

    #[test]
    fn zero_existing_value_requires_exact_zero_candidate() {
        assert!(is_duplicate(0.0, 0.0, 0.005));
        assert!(!is_duplicate(0.0, 0.1, 0.005));
    }
}
