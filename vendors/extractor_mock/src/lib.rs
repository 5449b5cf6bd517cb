use async_trait::async_trait;
use chrono::NaiveDate;
use vitalcore_shared::errors::{CoreError, CoreResult};
use vitalcore_shared::vendor::{ExtractedBiomarkerRow, ExtractionResult, LabExtractor, LabExtractorRegistrar};

/// Deterministic, offline stand-in for a real OCR/document-AI vendor.
///
/// Expects the uploaded bytes to be a small pipe-delimited text format
/// rather than a real PDF, so integration tests and local development don't
/// need a live extraction vendor wired up (`spec.md` §4.2, §9 "pluggable
/// extraction vendor"):
///
/// ```text
/// DATE:2026-01-15
/// LAB:Quest Diagnostics
/// Total Cholesterol|182|mg/dL
/// HDL Cholesterol|54|mg/dL
/// ```
pub struct MockLabExtractor;

#[async_trait]
impl LabExtractor for MockLabExtractor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn extract(&self, document_bytes: &[u8], _content_type: &str) -> CoreResult<ExtractionResult> {
        let text = std::str::from_utf8(document_bytes)
            .map_err(|e| CoreError::ExtractionFailure(format!("document is not valid UTF-8 text: {e}")))?;

        let mut test_date = None;
        let mut lab_name = None;
        let mut rows = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("DATE:") {
                test_date = Some(
                    NaiveDate::parse_from_str(rest.trim(), "%Y-%m-%d")
                        .map_err(|e| CoreError::ExtractionFailure(format!("invalid DATE line '{rest}': {e}")))?,
                );
                continue;
            }
            if let Some(rest) = line.strip_prefix("LAB:") {
                lab_name = Some(rest.trim().to_string());
                continue;
            }

            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            let [name, value, unit] = fields.as_slice() else {
                return Err(CoreError::ExtractionFailure(format!("malformed row: '{line}'")));
            };
            let value: f64 = value
                .parse()
                .map_err(|e| CoreError::ExtractionFailure(format!("row '{line}' has a non-numeric value: {e}")))?;
            rows.push(ExtractedBiomarkerRow {
                raw_name: (*name).to_string(),
                raw_value: value,
                raw_unit: (*unit).to_string(),
            });
        }

        Ok(ExtractionResult { lab_name, test_date, rows })
    }
}

inventory::submit! {
    LabExtractorRegistrar {
        name: "mock",
        factory: || std::sync::Arc::new(MockLabExtractor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_a_well_formed_document() {
        let doc = b"DATE:2026-01-15\nLAB:Quest Diagnostics\nTotal Cholesterol|182|mg/dL\nHDL Cholesterol|54|mg/dL\n";
        let result = MockLabExtractor.extract(doc, "application/pdf").await.unwrap();
        assert_eq!(result.test_date, NaiveDate::from_ymd_opt(2026, 1, 15));
        assert_eq!(result.lab_name.as_deref(), Some("Quest Diagnostics"));
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].raw_name, "Total Cholesterol");
        assert!((result.rows[0].raw_value - 182.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn rejects_a_malformed_row() {
        let doc = b"DATE:2026-01-15\nnot a valid row\n";
        assert!(MockLabExtractor.extract(doc, "application/pdf").await.is_err());
    }
}
