use crate::ids::{BiomarkerId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsightCategory {
    Biomarker,
    Sleep,
    Recovery,
    Nutrition,
    Activity,
    Correlation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightCard {
    pub id: Uuid,
    pub user: UserId,
    pub category: InsightCategory,
    pub title: String,
    pub body: String,
    pub action: Option<String>,
    pub target_biomarker: Option<BiomarkerId>,
    pub current_value: Option<f64>,
    pub target_value: Option<f64>,
    pub confidence_score: f64,
    pub pattern_signature: String,
    pub generated_date: NaiveDate,
    pub is_dismissed: bool,
    pub is_new: bool,
}

/// Direction a correlated pattern moves in, bucketed coarsely so the
/// signature is stable across small numeric fluctuations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketedDirection {
    Increase,
    Decrease,
    NoChange,
}

/// Deterministic hash of `{category, target_biomarker, discriminator,
/// bucketed direction}` so two generator passes over identical features
/// never recreate the same pattern twice (`spec.md` §4.8, §8). `discriminator`
/// carries whatever else distinguishes patterns within a category that
/// `target_biomarker` doesn't capture — e.g. a correlation finding's
/// `{event_type, metric_name}` pair — so two genuinely distinct patterns in
/// the same category never collide on the same signature.
#[must_use]
pub fn pattern_signature(
    category: InsightCategory,
    target_biomarker: Option<&BiomarkerId>,
    discriminator: &str,
    direction: BucketedDirection,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{category:?}"));
    hasher.update(
        target_biomarker
            .map(BiomarkerId::as_str)
            .unwrap_or_default(),
    );
    hasher.update(discriminator);
    hasher.update(format!("{direction:?}"));
    format!("{:x}", hasher.finalize())
}

/// Generated-insight shape from the AI generator. Opaque to the core beyond
/// the shape itself (`spec.md` §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedInsightPayload {
    pub lifestyle_actions: Vec<String>,
    pub nutrition: Vec<String>,
    pub supplementation: Vec<String>,
    pub medical_referral: Option<String>,
    pub medical_urgency: MedicalUrgency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MedicalUrgency {
    None,
    Routine,
    SoonFollowUp,
    Urgent,
}

/// Cache key: `(user, biomarker_id, measurement_fingerprint)`. The
/// fingerprint is `"{measurement_id}:{value_canonical}"`, so a re-measurement
/// that changes the value naturally busts the key (`spec.md` §4.8).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InsightCacheKey {
    pub user: UserId,
    pub biomarker_id: BiomarkerId,
    pub measurement_fingerprint: String,
}

impl InsightCacheKey {
    #[must_use]
    pub fn new(user: UserId, biomarker_id: BiomarkerId, measurement_id: Uuid, value_canonical: f64) -> Self {
        Self {
            user,
            biomarker_id,
            measurement_fingerprint: format!("{measurement_id}:{value_canonical}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedInsight {
    pub payload: GeneratedInsightPayload,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheStatus {
    Fresh,
    Stale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightEnvelope {
    pub payload: GeneratedInsightPayload,
    pub cache_status: CacheStatus,
    pub generated_at: DateTime<Utc>,
}
