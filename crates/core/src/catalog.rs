use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use vitalcore_shared::biomarker::{Biomarker, ReferenceRange, Synonym, UnitConversion};
use vitalcore_shared::ids::BiomarkerId;

/// Immutable reference-data snapshot. A `normalise()` call holds one `Arc`
/// for its whole duration, so a concurrent hot reload never tears a single
/// call's view of the catalog (`spec.md` §5, §9).
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    pub biomarkers: HashMap<BiomarkerId, Biomarker>,
    pub synonyms: HashMap<String, BiomarkerId>,
    pub conversions: Vec<UnitConversion>,
    pub ranges: HashMap<BiomarkerId, Vec<ReferenceRange>>,
}

impl CatalogSnapshot {
    #[must_use]
    pub fn resolve_name(&self, raw_name: &str) -> Option<BiomarkerId> {
        self.synonyms.get(&raw_name.trim().to_lowercase()).cloned()
    }

    #[must_use]
    pub fn conversion(&self, biomarker_id: &BiomarkerId, from_unit: &str, to_unit: &str) -> Option<UnitConversion> {
        self.conversions
            .iter()
            .find(|c| &c.biomarker_id == biomarker_id && c.from_unit == from_unit && c.to_unit == to_unit)
            .cloned()
            .or_else(|| {
                // two-hop path via the biomarker's canonical unit
                let biomarker = self.biomarkers.get(biomarker_id)?;
                if to_unit == biomarker.canonical_unit {
                    return None;
                }
                let first = self
                    .conversions
                    .iter()
                    .find(|c| &c.biomarker_id == biomarker_id && c.from_unit == from_unit && c.to_unit == biomarker.canonical_unit)?;
                let second = self
                    .conversions
                    .iter()
                    .find(|c| &c.biomarker_id == biomarker_id && c.from_unit == biomarker.canonical_unit && c.to_unit == to_unit)?;
                Some(UnitConversion {
                    biomarker_id: biomarker_id.clone(),
                    from_unit: from_unit.to_string(),
                    to_unit: to_unit.to_string(),
                    kind: vitalcore_shared::biomarker::ConversionKind::Affine,
                    multiplier: first.multiplier * second.multiplier,
                    offset: first.offset * second.multiplier + second.offset,
                })
            })
    }
}

/// Atomically-swappable holder for the active catalog snapshot. Readers
/// clone the `Arc` under a brief read lock and then work against their own
/// reference, so a reload never invalidates an in-flight `normalise()` call.
pub struct Catalog {
    inner: RwLock<Arc<CatalogSnapshot>>,
}

impl Catalog {
    #[must_use]
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            inner: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub async fn current(&self) -> Arc<CatalogSnapshot> {
        self.inner.read().await.clone()
    }

    pub async fn reload(&self, snapshot: CatalogSnapshot) {
        let mut guard = self.inner.write().await;
        *guard = Arc::new(snapshot);
    }
}

/// Seed data compiled into the binary so the crate runs without an external
/// reference-data service (`spec.md` §9). A real deployment would instead
/// load this from a managed catalog store and call `Catalog::reload`.
#[must_use]
pub fn seed_snapshot() -> CatalogSnapshot {
    use vitalcore_shared::biomarker::{BiomarkerCategory, ConversionKind, RangeContext, Sex};

    let mut biomarkers = HashMap::new();
    let mut synonyms = HashMap::new();
    let mut conversions = Vec::new();
    let mut ranges: HashMap<BiomarkerId, Vec<ReferenceRange>> = HashMap::new();

    let glucose = BiomarkerId::new("glucose");
    biomarkers.insert(
        glucose.clone(),
        Biomarker {
            id: glucose.clone(),
            canonical_name: "Glucose".to_string(),
            category: BiomarkerCategory::Metabolic,
            canonical_unit: "mg/dL".to_string(),
            display_unit_preference: None,
            precision: 0,
            global_default_ref_min: Some(70.0),
            global_default_ref_max: Some(99.0),
        },
    );
    for syn in ["glucose", "blood glucose", "fasting glucose", "glu"] {
        synonyms.insert(syn.to_string(), glucose.clone());
    }
    conversions.push(UnitConversion {
        biomarker_id: glucose.clone(),
        from_unit: "mmol/L".to_string(),
        to_unit: "mg/dL".to_string(),
        kind: ConversionKind::Linear,
        multiplier: 18.0182,
        offset: 0.0,
    });
    ranges.insert(
        glucose.clone(),
        vec![
            ReferenceRange {
                biomarker_id: glucose.clone(),
                unit: "mg/dL".to_string(),
                low: 70.0,
                high: 99.0,
                critical_low: Some(54.0),
                critical_high: Some(250.0),
                context: RangeContext {
                    fasting: Some(true),
                    ..Default::default()
                },
                source_priority: 0,
            },
            ReferenceRange {
                biomarker_id: glucose.clone(),
                unit: "mg/dL".to_string(),
                low: 70.0,
                high: 140.0,
                critical_low: Some(54.0),
                critical_high: Some(250.0),
                context: RangeContext::default(),
                source_priority: 1,
            },
        ],
    );

    let ferritin = BiomarkerId::new("ferritin");
    biomarkers.insert(
        ferritin.clone(),
        Biomarker {
            id: ferritin.clone(),
            canonical_name: "Ferritin".to_string(),
            category: BiomarkerCategory::Hematology,
            canonical_unit: "ng/mL".to_string(),
            display_unit_preference: None,
            precision: 1,
            global_default_ref_min: Some(20.0),
            global_default_ref_max: Some(250.0),
        },
    );
    for syn in ["ferritin", "serum ferritin"] {
        synonyms.insert(syn.to_string(), ferritin.clone());
    }
    conversions.push(UnitConversion {
        biomarker_id: ferritin.clone(),
        from_unit: "mcg/L".to_string(),
        to_unit: "ng/mL".to_string(),
        kind: ConversionKind::Linear,
        multiplier: 1.0,
        offset: 0.0,
    });
    ranges.insert(
        ferritin.clone(),
        vec![
            ReferenceRange {
                biomarker_id: ferritin.clone(),
                unit: "ng/mL".to_string(),
                low: 20.0,
                high: 250.0,
                critical_low: Some(10.0),
                critical_high: None,
                context: RangeContext {
                    sex: Some(Sex::Male),
                    ..Default::default()
                },
                source_priority: 0,
            },
            ReferenceRange {
                biomarker_id: ferritin.clone(),
                unit: "ng/mL".to_string(),
                low: 10.0,
                high: 150.0,
                critical_low: Some(5.0),
                critical_high: None,
                context: RangeContext {
                    sex: Some(Sex::Female),
                    ..Default::default()
                },
                source_priority: 0,
            },
            ReferenceRange {
                biomarker_id: ferritin.clone(),
                unit: "ng/mL".to_string(),
                low: 15.0,
                high: 200.0,
                critical_low: Some(5.0),
                critical_high: None,
                context: RangeContext::default(),
                source_priority: 1,
            },
        ],
    );

    CatalogSnapshot {
        biomarkers,
        synonyms,
        conversions,
        ranges,
    }
}
