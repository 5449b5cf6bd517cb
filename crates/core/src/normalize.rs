use crate::catalog::CatalogSnapshot;
use vitalcore_shared::biomarker::{
    Flag, NormalisationContext, NormalisationWarning, NormalisedMeasurement, RangeContext,
    RawObservation, ReferenceRange,
};
use vitalcore_shared::errors::{CoreError, CoreResult};

/// Pure normalisation entry point: fixed catalog snapshot + fixed input
/// always yields the same output, which is what makes this cacheable and
/// directly unit-testable without touching the database (`spec.md` §4.1).
pub fn normalise(
    snapshot: &CatalogSnapshot,
    input: &RawObservation,
    context: &NormalisationContext,
) -> CoreResult<NormalisedMeasurement> {
    let biomarker_id = snapshot
        .resolve_name(&input.name)
        .ok_or_else(|| CoreError::BiomarkerNotFound(input.name.clone()))?;
    let biomarker = snapshot
        .biomarkers
        .get(&biomarker_id)
        .ok_or_else(|| CoreError::BiomarkerNotFound(input.name.clone()))?;

    let mut warnings = Vec::new();

    let (value_canonical, used_conversion) = if input.unit == biomarker.canonical_unit {
        (input.value, false)
    } else {
        let conversion = snapshot
            .conversion(&biomarker_id, &input.unit, &biomarker.canonical_unit)
            .ok_or_else(|| CoreError::UnitConversionError {
                from: input.unit.clone(),
                to: biomarker.canonical_unit.clone(),
            })?;
        (conversion.apply(input.value), true)
    };
    if used_conversion {
        warnings.push(NormalisationWarning::ApproximateUnitConversion);
    }

    let candidate_ranges = snapshot.ranges.get(&biomarker_id).cloned().unwrap_or_default();
    let (selected_range, mut selection_warnings) = select_range(&candidate_ranges, context)?;
    warnings.append(&mut selection_warnings);

    let flags = assign_flags(value_canonical, &selected_range);

    let value_display = round_to(value_canonical, biomarker.precision);

    Ok(NormalisedMeasurement {
        biomarker_id,
        value_canonical,
        unit_canonical: biomarker.canonical_unit.clone(),
        value_display,
        unit_display: biomarker
            .display_unit_preference
            .clone()
            .unwrap_or_else(|| biomarker.canonical_unit.clone()),
        selected_range,
        flags,
        warnings,
        context_used: context.clone(),
    })
}

fn round_to(value: f64, precision: u8) -> f64 {
    let factor = 10f64.powi(i32::from(precision));
    (value * factor).round() / factor
}

/// Scores each candidate range against the observation context per `spec.md`
/// §4.1 step 3, excludes incompatible ranges, and breaks ties by
/// specificity then `source_priority`.
fn select_range(
    candidates: &[ReferenceRange],
    context: &NormalisationContext,
) -> CoreResult<(ReferenceRange, Vec<NormalisationWarning>)> {
    let mut warnings = Vec::new();
    let mut best: Option<(i32, &ReferenceRange)> = None;

    for range in candidates {
        if is_incompatible(&range.context, context) {
            continue;
        }
        let score = score_range(&range.context, context);
        let better = match &best {
            None => true,
            Some((best_score, best_range)) => {
                score > *best_score
                    || (score == *best_score
                        && range.context.specificity() > best_range.context.specificity())
                    || (score == *best_score
                        && range.context.specificity() == best_range.context.specificity()
                        && range.source_priority < best_range.source_priority)
            }
        };
        if better {
            best = Some((score, range));
        }
    }

    let selected = best
        .map(|(_, r)| r.clone())
        .ok_or_else(|| CoreError::RangeSelectionError("no compatible reference range found".to_string()))?;

    if selected.context.sex.is_none() {
        warnings.push(NormalisationWarning::NoSexSpecificRange);
    }
    if selected.context.age_years_min.is_none() && selected.context.age_years_max.is_none() {
        warnings.push(NormalisationWarning::NoAgeSpecificRange);
    }
    if selected.context == RangeContext::default() {
        warnings.push(NormalisationWarning::FellBackToGlobalDefault);
    }

    Ok((selected, warnings))
}

fn is_incompatible(range_ctx: &RangeContext, observed: &NormalisationContext) -> bool {
    if let (Some(range_sex), Some(observed_sex)) = (range_ctx.sex, observed.sex) {
        if range_sex != observed_sex {
            return true;
        }
    }
    if let (Some(min), Some(age)) = (range_ctx.age_years_min, observed.age_years) {
        if age < min {
            return true;
        }
    }
    if let (Some(max), Some(age)) = (range_ctx.age_years_max, observed.age_years) {
        if age > max {
            return true;
        }
    }
    if let (Some(range_fasting), Some(observed_fasting)) = (range_ctx.fasting, observed.fasting) {
        if range_fasting != observed_fasting {
            return true;
        }
    }
    if let (Some(range_pregnancy), Some(observed_pregnancy)) = (range_ctx.pregnancy, observed.pregnancy) {
        if range_pregnancy != observed_pregnancy {
            return true;
        }
    }
    false
}

fn score_range(range_ctx: &RangeContext, observed: &NormalisationContext) -> i32 {
    let mut score = 0;
    if let (Some(range_sex), Some(observed_sex)) = (range_ctx.sex, observed.sex) {
        if range_sex == observed_sex {
            score += 2;
        }
    }
    if let Some(age) = observed.age_years {
        let in_band = range_ctx.age_years_min.map_or(true, |min| age >= min)
            && range_ctx.age_years_max.map_or(true, |max| age <= max)
            && (range_ctx.age_years_min.is_some() || range_ctx.age_years_max.is_some());
        if in_band {
            score += 2;
        }
    }
    if range_ctx.fasting.is_some() && range_ctx.fasting == observed.fasting {
        score += 1;
    }
    if range_ctx.pregnancy.is_some() && range_ctx.pregnancy == observed.pregnancy {
        score += 1;
    }
    if range_ctx.method.is_some() && range_ctx.method == observed.method {
        score += 1;
    }
    if range_ctx.lab_id.is_some() && range_ctx.lab_id == observed.lab_id {
        score += 1;
    }
    score
}

fn assign_flags(value: f64, range: &ReferenceRange) -> Vec<Flag> {
    let mut flags = Vec::new();
    if let Some(critical_low) = range.critical_low {
        if value <= critical_low {
            flags.push(Flag::CriticalLow);
        }
    }
    if let Some(critical_high) = range.critical_high {
        if value >= critical_high {
            flags.push(Flag::CriticalHigh);
        }
    }
    if flags.is_empty() {
        if value < range.low {
            flags.push(Flag::Low);
        } else if value > range.high {
            flags.push(Flag::High);
        } else {
            flags.push(Flag::Optimal);
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::seed_snapshot;

    fn ctx(sex: Option<vitalcore_shared::biomarker::Sex>, fasting: Option<bool>) -> NormalisationContext {
        NormalisationContext {
            sex,
            fasting,
            ..Default::default()
        }
    }

    #[test]
    fn converts_mmol_glucose_to_canonical_mg_dl() {
        let snapshot = seed_snapshot();
        let input = RawObservation {
            name: "Blood Glucose".to_string(),
            value: 5.0,
            unit: "mmol/L".to_string(),
        };
        let result = normalise(&snapshot, &input, &ctx(None, Some(true))).unwrap();
        assert!((result.value_canonical - 90.091).abs() < 0.01);
        assert_eq!(result.unit_canonical, "mg/dL");
    }

    #[test]
    fn selects_sex_specific_ferritin_range_over_global_default() {
        let snapshot = seed_snapshot();
        let input = RawObservation {
            name: "ferritin".to_string(),
            value: 12.0,
            unit: "ng/mL".to_string(),
        };
        let result = normalise(&snapshot, &input, &ctx(Some(vitalcore_shared::biomarker::Sex::Female), None)).unwrap();
        assert_eq!(result.selected_range.low, 10.0);
        assert!(result.flags.contains(&Flag::Optimal));
    }

    #[test]
    fn unknown_biomarker_name_fails() {
        let snapshot = seed_snapshot();
        let input = RawObservation {
            name: "unobtainium".to_string(),
            value: 1.0,
            unit: "mg/dL".to_string(),
        };
        assert!(matches!(
            normalise(&snapshot, &input, &NormalisationContext::default()),
            Err(CoreError::BiomarkerNotFound(_))
        ));
    }

    #[test]
    fn no_unit_path_fails_with_unit_conversion_error() {
        let snapshot = seed_snapshot();
        let input = RawObservation {
            name: "glucose".to_string(),
            value: 1.0,
            unit: "furlongs".to_string(),
        };
        assert!(matches!(
            normalise(&snapshot, &input, &NormalisationContext::default()),
            Err(CoreError::UnitConversionError { .. })
        ));
    }
}
