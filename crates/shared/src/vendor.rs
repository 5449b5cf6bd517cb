use crate::errors::CoreResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One biomarker row as read off a lab PDF/image before normalisation
/// touches it (`spec.md` §4.2 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedBiomarkerRow {
    pub raw_name: String,
    pub raw_value: f64,
    pub raw_unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub lab_name: Option<String>,
    pub test_date: Option<chrono::NaiveDate>,
    pub rows: Vec<ExtractedBiomarkerRow>,
}

/// Abstraction over whichever OCR/document-AI vendor reads a lab report.
/// Implementations live under `vendors/` and are selected by configuration
/// string, never hardcoded into the core (`spec.md` §4.2, §9 "dynamic
/// dispatch on external AIs").
#[async_trait]
pub trait LabExtractor: Send + Sync {
    fn name(&self) -> &str;
    async fn extract(&self, document_bytes: &[u8], content_type: &str) -> CoreResult<ExtractionResult>;
}

/// Abstraction over the insight-generating LLM vendor (`spec.md` §4.8).
#[async_trait]
pub trait LlmVendor: Send + Sync {
    fn name(&self) -> &str;
    async fn generate_insight(&self, prompt: &str) -> CoreResult<String>;
}

/// Abstraction over durable blob storage for uploaded lab documents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> CoreResult<()>;
    async fn get(&self, key: &str) -> CoreResult<Vec<u8>>;
    async fn delete(&self, key: &str) -> CoreResult<()>;
}

/// Abstraction over outbound push notifications (e.g. "your forecast
/// confidence dropped"). Optional vendor: not every deployment wires one up.
#[async_trait]
pub trait PushDispatcher: Send + Sync {
    async fn dispatch(&self, user_device_token: &str, title: &str, body: &str) -> CoreResult<()>;
}

pub struct LabExtractorRegistrar {
    pub name: &'static str,
    pub factory: fn() -> Arc<dyn LabExtractor>,
}

pub struct LlmVendorRegistrar {
    pub name: &'static str,
    pub factory: fn() -> Arc<dyn LlmVendor>,
}

pub struct ObjectStoreRegistrar {
    pub name: &'static str,
    pub factory: fn() -> Arc<dyn ObjectStore>,
}

inventory::collect!(LabExtractorRegistrar);
inventory::collect!(LlmVendorRegistrar);
inventory::collect!(ObjectStoreRegistrar);

/// Looks up a registered `LabExtractor` by the vendor name configured in
/// `AppConfig::lab_extractor_vendor`.
#[must_use]
pub fn find_lab_extractor(name: &str) -> Option<Arc<dyn LabExtractor>> {
    inventory::iter::<LabExtractorRegistrar>()
        .find(|r| r.name == name)
        .map(|r| (r.factory)())
}

#[must_use]
pub fn find_llm_vendor(name: &str) -> Option<Arc<dyn LlmVendor>> {
    inventory::iter::<LlmVendorRegistrar>()
        .find(|r| r.name == name)
        .map(|r| (r.factory)())
}

#[must_use]
pub fn find_object_store(name: &str) -> Option<Arc<dyn ObjectStore>> {
    inventory::iter::<ObjectStoreRegistrar>()
        .find(|r| r.name == name)
        .map(|r| (r.factory)())
}
