use crate::ids::BiomarkerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiomarkerCategory {
    Metabolic,
    Lipid,
    Hormonal,
    Hematology,
    Inflammatory,
    Vitamin,
    Mineral,
    Renal,
    Hepatic,
    Cardiac,
}

/// Reference-data record. Immutable within a catalog snapshot; identifier is
/// stable across releases so historical measurements keep resolving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Biomarker {
    pub id: BiomarkerId,
    pub canonical_name: String,
    pub category: BiomarkerCategory,
    pub canonical_unit: String,
    pub display_unit_preference: Option<String>,
    pub precision: u8,
    pub global_default_ref_min: Option<f64>,
    pub global_default_ref_max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synonym {
    pub biomarker_id: BiomarkerId,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionKind {
    Linear,
    Affine,
}

/// `canonical = raw * multiplier` (LINEAR) or `raw * multiplier + offset`
/// (AFFINE). Directional: `from_unit -> to_unit` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConversion {
    pub biomarker_id: BiomarkerId,
    pub from_unit: String,
    pub to_unit: String,
    pub kind: ConversionKind,
    pub multiplier: f64,
    pub offset: f64,
}

impl UnitConversion {
    #[must_use]
    pub fn apply(&self, raw: f64) -> f64 {
        match self.kind {
            ConversionKind::Linear => raw * self.multiplier,
            ConversionKind::Affine => raw * self.multiplier + self.offset,
        }
    }

    /// The inverse conversion, used by the round-trip property test
    /// (`spec.md` §8: converting `v u1 -> u2 -> u1` must return `v`).
    #[must_use]
    pub fn invert(&self) -> Self {
        match self.kind {
            ConversionKind::Linear => Self {
                biomarker_id: self.biomarker_id.clone(),
                from_unit: self.to_unit.clone(),
                to_unit: self.from_unit.clone(),
                kind: ConversionKind::Linear,
                multiplier: 1.0 / self.multiplier,
                offset: 0.0,
            },
            ConversionKind::Affine => Self {
                biomarker_id: self.biomarker_id.clone(),
                from_unit: self.to_unit.clone(),
                to_unit: self.from_unit.clone(),
                kind: ConversionKind::Affine,
                multiplier: 1.0 / self.multiplier,
                offset: -self.offset / self.multiplier,
            },
        }
    }
}

/// Partial specification a reference range is scoped to. Every field is
/// independently optional — absence means "this dimension does not
/// constrain the range", never a default value (`spec.md` §9).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeContext {
    pub age_years_min: Option<f64>,
    pub age_years_max: Option<f64>,
    pub sex: Option<Sex>,
    pub fasting: Option<bool>,
    pub pregnancy: Option<bool>,
    pub method: Option<String>,
    pub lab_id: Option<String>,
}

impl RangeContext {
    /// Count of dimensions this range actually constrains — used as the
    /// "narrower context wins" tie-break in range selection.
    #[must_use]
    pub fn specificity(&self) -> u32 {
        [
            self.age_years_min.is_some() || self.age_years_max.is_some(),
            self.sex.is_some(),
            self.fasting.is_some(),
            self.pregnancy.is_some(),
            self.method.is_some(),
            self.lab_id.is_some(),
        ]
        .iter()
        .filter(|x| **x)
        .count() as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceRange {
    pub biomarker_id: BiomarkerId,
    pub unit: String,
    pub low: f64,
    pub high: f64,
    pub critical_low: Option<f64>,
    pub critical_high: Option<f64>,
    pub context: RangeContext,
    /// Deterministic tie-break priority when two ranges tie on specificity;
    /// lower wins. Assigned at catalog load time from source order.
    pub source_priority: u32,
}

/// The observed context used to select a reference range — a subset of
/// `RangeContext`'s dimensions plus the concrete age, since the observer
/// supplies a point-in-time age rather than a band.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalisationContext {
    pub age_years: Option<f64>,
    pub sex: Option<Sex>,
    pub fasting: Option<bool>,
    pub pregnancy: Option<bool>,
    pub method: Option<String>,
    pub lab_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flag {
    Low,
    High,
    CriticalLow,
    CriticalHigh,
    Optimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalisationWarning {
    NoSexSpecificRange,
    NoAgeSpecificRange,
    FellBackToGlobalDefault,
    ApproximateUnitConversion,
}

impl std::fmt::Display for NormalisationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::NoSexSpecificRange => "no sex-specific range available",
            Self::NoAgeSpecificRange => "no age-specific range available",
            Self::FellBackToGlobalDefault => "fell back to the global default range",
            Self::ApproximateUnitConversion => "unit conversion applied via a two-hop path",
        };
        write!(f, "{msg}")
    }
}

/// Raw observation fed into `normalise()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawObservation {
    pub name: String,
    pub value: f64,
    pub unit: String,
}

/// Output of a successful `normalise()` call — everything needed to persist
/// a `Measurement` and to reproduce the calculation later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalisedMeasurement {
    pub biomarker_id: BiomarkerId,
    pub value_canonical: f64,
    pub unit_canonical: String,
    pub value_display: f64,
    pub unit_display: String,
    pub selected_range: ReferenceRange,
    pub flags: Vec<Flag>,
    pub warnings: Vec<NormalisationWarning>,
    pub context_used: NormalisationContext,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glucose_id() -> BiomarkerId {
        BiomarkerId::new("glucose")
    }

    #[test]
    fn linear_conversion_round_trips() {
        let mg_dl_to_mmol_l = UnitConversion {
            biomarker_id: glucose_id(),
            from_unit: "mg/dL".into(),
            to_unit: "mmol/L".into(),
            kind: ConversionKind::Linear,
            multiplier: 0.0555,
            offset: 0.0,
        };
        let canonical = mg_dl_to_mmol_l.apply(90.0);
        let back = mg_dl_to_mmol_l.invert().apply(canonical);
        assert!((back - 90.0).abs() < 1e-6);
    }

    #[test]
    fn affine_conversion_round_trips() {
        let f_to_c = UnitConversion {
            biomarker_id: BiomarkerId::new("body_temp"),
            from_unit: "F".into(),
            to_unit: "C".into(),
            kind: ConversionKind::Affine,
            multiplier: 5.0 / 9.0,
            offset: -(5.0 / 9.0) * 32.0,
        };
        let canonical = f_to_c.apply(98.6);
        let back = f_to_c.invert().apply(canonical);
        assert!((back - 98.6).abs() < 1e-6);
    }

    #[test]
    fn specificity_counts_populated_dimensions_only() {
        let ctx = RangeContext {
            age_years_min: Some(18.0),
            sex: Some(Sex::Female),
            ..Default::default()
        };
        assert_eq!(ctx.specificity(), 2);
        assert_eq!(RangeContext::default().specificity(), 0);
    }
}
