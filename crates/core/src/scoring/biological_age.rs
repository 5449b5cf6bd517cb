use crate::catalog::CatalogSnapshot;
use chrono::Utc;
use vitalcore_shared::errors::{CoreError, CoreResult};
use vitalcore_shared::ids::UserId;
use vitalcore_shared::measurement::Measurement;
use vitalcore_shared::scores::{BiologicalAgeEstimate, ContributingBiomarker};

/// Fixed panel of biomarkers the estimator draws on, with relative weights.
/// A deployment-tunable list would move this into the Reference Catalog;
/// kept as a constant here since the panel composition is itself a model
/// decision, not reference data (SPEC_FULL.md §4.5 Open Question).
const PANEL: &[(&str, f64)] = &[("glucose", 0.5), ("ferritin", 0.5)];

/// Deterministic function of each panel biomarker's z-score against the
/// age/sex-appropriate reference range `normalise()` already selected for
/// that measurement (`measurement.reference_low`/`reference_high`, not the
/// catalog's generic global default), scaled by chronological age: each
/// standard-range-width deviation shifts the estimate by roughly two years.
/// Requires at least one panel biomarker with a recent measurement, or
/// returns `InsufficientData` (SPEC_FULL.md §4.5).
pub fn compute(
    user: UserId,
    chronological_age_years: f64,
    snapshot: &CatalogSnapshot,
    latest_by_biomarker: &[Measurement],
) -> CoreResult<BiologicalAgeEstimate> {
    let mut contributions = Vec::new();

    for (biomarker_slug, weight) in PANEL {
        let Some(measurement) = latest_by_biomarker.iter().find(|m| m.biomarker_id.as_str() == *biomarker_slug) else {
            continue;
        };
        if !snapshot.biomarkers.contains_key(&measurement.biomarker_id) {
            continue;
        }
        let lo = measurement.reference_low;
        let hi = measurement.reference_high;
        let mid = (lo + hi) / 2.0;
        let spread = ((hi - lo) / 4.0).max(1e-6);
        let z = (measurement.value_canonical - mid) / spread;
        contributions.push(ContributingBiomarker {
            biomarker_id: measurement.biomarker_id.clone(),
            z_score: z,
            weight: *weight,
        });
    }

    if contributions.is_empty() {
        return Err(CoreError::InsufficientData(
            "no panel biomarkers have a recorded measurement".to_string(),
        ));
    }

    let weight_total: f64 = contributions.iter().map(|c| c.weight).sum();
    let weighted_z = contributions.iter().map(|c| c.z_score * c.weight).sum::<f64>() / weight_total;

    // two years of estimated age shift per standard reference-range-width deviation
    let delta_years = weighted_z * 2.0;
    let estimated_age_years = (chronological_age_years + delta_years).max(0.0);

    Ok(BiologicalAgeEstimate {
        user,
        estimated_age_years,
        delta_years,
        contributing_biomarkers: contributions,
        generated_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::seed_snapshot;
    use vitalcore_shared::biomarker::{Flag, NormalisationContext};
    use vitalcore_shared::ids::{BiomarkerId, MeasurementId, SessionId};
    use vitalcore_shared::measurement::MeasurementSource;

    fn glucose_measurement(value: f64) -> Measurement {
        Measurement {
            id: MeasurementId::random(),
            session: SessionId::random(),
            biomarker_id: BiomarkerId::new("glucose"),
            source: MeasurementSource::Manual,
            value_raw: value,
            unit_raw: "mg/dL".to_string(),
            value_canonical: value,
            unit_canonical: "mg/dL".to_string(),
            value_display: value,
            reference_low: 70.0,
            reference_high: 99.0,
            flags: vec![Flag::Optimal],
            warnings: vec![],
            normalization_context: NormalisationContext::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            updated_by: None,
        }
    }

    #[test]
    fn elevated_glucose_raises_estimated_age() {
        let snapshot = seed_snapshot();
        let measurements = vec![glucose_measurement(130.0)];
        let estimate = compute(UserId::random(), 40.0, &snapshot, &measurements).unwrap();
        assert!(estimate.delta_years > 0.0);
        assert!(estimate.estimated_age_years > 40.0);
    }

    #[test]
    fn fails_without_any_panel_biomarker() {
        let snapshot = seed_snapshot();
        assert!(matches!(
            compute(UserId::random(), 40.0, &snapshot, &[]),
            Err(CoreError::InsufficientData(_))
        ));
    }

    fn ferritin_measurement(value: f64, reference_low: f64, reference_high: f64) -> Measurement {
        Measurement {
            id: MeasurementId::random(),
            session: SessionId::random(),
            biomarker_id: BiomarkerId::new("ferritin"),
            source: MeasurementSource::Manual,
            value_raw: value,
            unit_raw: "ng/mL".to_string(),
            value_canonical: value,
            unit_canonical: "ng/mL".to_string(),
            value_display: value,
            reference_low,
            reference_high,
            flags: vec![Flag::Optimal],
            warnings: vec![],
            normalization_context: NormalisationContext::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            updated_by: None,
        }
    }

    /// Ferritin's catalog global default is `(20.0, 250.0)` (see
    /// `catalog::seed_snapshot`), but the female-selected range `normalise()`
    /// would have attached is `(10.0, 150.0)`. Two users with the same
    /// `value_canonical` and the same global default must still get
    /// different contributions when their *selected* ranges differ — the
    /// estimator must read `measurement.reference_low/high`, not re-derive
    /// the generic catalog default.
    #[test]
    fn uses_the_measurements_selected_range_not_the_catalog_global_default() {
        let snapshot = seed_snapshot();
        let male_selected = vec![ferritin_measurement(80.0, 20.0, 250.0)];
        let female_selected = vec![ferritin_measurement(80.0, 10.0, 150.0)];

        let male_estimate = compute(UserId::random(), 40.0, &snapshot, &male_selected).unwrap();
        let female_estimate = compute(UserId::random(), 40.0, &snapshot, &female_selected).unwrap();

        assert_ne!(male_estimate.delta_years, female_estimate.delta_years);
    }
}
