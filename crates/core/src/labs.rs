use crate::catalog::Catalog;
use crate::db::Db;
use crate::measurements::MeasurementStore;
use chrono::{Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use vitalcore_shared::biomarker::{NormalisationContext, RawObservation};
use vitalcore_shared::errors::{CoreError, CoreResult};
use vitalcore_shared::ids::{JobId, UserId};
use vitalcore_shared::labjob::{FailedBiomarker, JobStatus, JobStepName, LabUploadJob, StepStatus};
use vitalcore_shared::measurement::MeasurementSource;
use vitalcore_shared::vendor::{LabExtractor, ObjectStore};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub struct LabUploadPipeline {
    pub db: Arc<Db>,
    pub catalog: Arc<Catalog>,
    pub extractor: Arc<dyn LabExtractor>,
    pub object_store: Arc<dyn ObjectStore>,
    /// `AppConfig::dedup_epsilon_fraction` (`spec.md` §9 Open Question 4),
    /// applied the same way the manual-entry path applies it.
    pub dedup_epsilon_fraction: f64,
}

impl LabUploadPipeline {
    /// Step 1: accept the file, store it, create the job in `pending`.
    /// `spec.md` §4.3 step 1: PDF only, ≤10 MiB.
    pub async fn accept_upload(&self, user: UserId, bytes: &[u8], content_type: &str) -> CoreResult<LabUploadJob> {
        if content_type != "application/pdf" {
            return Err(CoreError::ValidationError("lab uploads must be application/pdf".to_string()));
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(CoreError::ValidationError(format!(
                "lab upload exceeds the {MAX_UPLOAD_BYTES} byte limit"
            )));
        }

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let sha256 = format!("{:x}", hasher.finalize());

        self.object_store.put(&sha256, bytes).await?;

        let mut job = LabUploadJob::new(user, sha256.clone(), sha256);
        job.push_step(JobStepName::Uploaded, StepStatus::Succeeded, None);
        self.db.upsert_job(&job).await?;
        Ok(job)
    }

    /// Steps 2-8: runs the extractor, validates, normalises each row, and
    /// persists successful measurements under one new session
    /// (`spec.md` §4.3). Spawned off the request path by the caller.
    pub async fn process(&self, job_id: JobId) -> CoreResult<()> {
        let mut job = self.db.get_job(job_id).await?;
        job.status = JobStatus::Processing;
        job.push_step(JobStepName::Extracting, StepStatus::Started, None);
        self.db.upsert_job(&job).await?;

        let bytes = match crate::retry::with_backoff("object_store.get", || self.object_store.get(&job.file_sha256)).await {
            Ok(b) => b,
            Err(e) => return self.fail(&mut job, format!("object store read failed: {e}")).await,
        };

        let extraction = match self.extractor.extract(&bytes, "application/pdf").await {
            Ok(e) => e,
            Err(e) => return self.fail(&mut job, format!("extraction failed: {e}")).await,
        };
        job.push_step(JobStepName::Extracting, StepStatus::Succeeded, None);

        job.push_step(JobStepName::ValidatingTestDate, StepStatus::Started, None);
        let test_date = match extraction.test_date {
            Some(d) => d,
            None => return self.fail(&mut job, "extractor did not return a test date".to_string()).await,
        };
        let today = Utc::now().date_naive();
        let ten_years_ago = today - ChronoDuration::days(365 * 10);
        if test_date < ten_years_ago || test_date > today {
            return self
                .fail(&mut job, format!("test date {test_date} is outside the allowed window"))
                .await;
        }
        job.push_step(JobStepName::ValidatingTestDate, StepStatus::Succeeded, None);

        job.push_step(JobStepName::Normalising, StepStatus::Started, None);
        let snapshot = self.catalog.current().await;
        let mut seen_biomarker_ids = std::collections::HashSet::new();
        let mut normalised_rows = Vec::new();
        let mut failed_biomarkers = Vec::new();

        for row in &extraction.rows {
            let input = RawObservation {
                name: row.raw_name.clone(),
                value: row.raw_value,
                unit: row.raw_unit.clone(),
            };
            let result = crate::normalize::normalise(&snapshot, &input, &NormalisationContext::default());
            match result {
                Ok(normalised) => {
                    if !seen_biomarker_ids.insert(normalised.biomarker_id.clone()) {
                        failed_biomarkers.push(FailedBiomarker {
                            raw_name: row.raw_name.clone(),
                            raw_value: row.raw_value,
                            raw_unit: row.raw_unit.clone(),
                            error: CoreError::DuplicateMeasurement {
                                biomarker_id: normalised.biomarker_id.as_str().to_string(),
                                test_date: test_date.to_string(),
                            },
                        });
                        continue;
                    }
                    normalised_rows.push((row.clone(), normalised));
                }
                Err(e) => failed_biomarkers.push(FailedBiomarker {
                    raw_name: row.raw_name.clone(),
                    raw_value: row.raw_value,
                    raw_unit: row.raw_unit.clone(),
                    error: e,
                }),
            }
        }
        job.push_step(JobStepName::Normalising, StepStatus::Succeeded, None);

        job.push_step(JobStepName::DeduplicatingAndPersisting, StepStatus::Started, None);
        let store = MeasurementStore::new(&self.db, &self.catalog);
        let session = store
            .create_session(job.user, MeasurementSource::AiExtracted, test_date, extraction.lab_name.clone())
            .await?;

        let mut persisted = 0usize;
        for (row, normalised) in normalised_rows {
            let input = RawObservation {
                name: row.raw_name.clone(),
                value: row.raw_value,
                unit: row.raw_unit.clone(),
            };
            match store
                .create_measurement(job.user, &session, &input, &NormalisationContext::default(), self.dedup_epsilon_fraction)
                .await
            {
                Ok(_) => persisted += 1,
                Err(e) => failed_biomarkers.push(FailedBiomarker {
                    raw_name: row.raw_name,
                    raw_value: row.raw_value,
                    raw_unit: row.raw_unit,
                    error: e,
                }),
            }
            let _ = normalised;
        }
        job.push_step(JobStepName::DeduplicatingAndPersisting, StepStatus::Succeeded, None);

        job.result_payload.persisted_measurement_count = persisted;
        job.result_payload.failed_biomarkers = failed_biomarkers.clone();
        job.result_payload.session_id = Some(session.id);
        job.result_payload.lab_name = extraction.lab_name;

        job.status = if !failed_biomarkers.is_empty() {
            JobStatus::NeedsReview
        } else {
            JobStatus::Completed
        };
        self.db.upsert_job(&job).await?;
        info!(job_id = %job.id, status = ?job.status, persisted, "lab upload job finished");
        Ok(())
    }

    async fn fail(&self, job: &mut LabUploadJob, detail: String) -> CoreResult<()> {
        warn!(job_id = %job.id, detail = %detail, "lab upload job failed");
        job.status = JobStatus::Failed;
        job.error_details = Some(detail);
        self.db.upsert_job(job).await?;
        Ok(())
    }

    pub async fn get_job_status(&self, job_id: JobId) -> CoreResult<LabUploadJob> {
        self.db.get_job(job_id).await
    }

    /// Requeues jobs left in `processing` from a previous crash, per
    /// `spec.md` §4.3 "crashes resume at the last checkpoint".
    pub async fn resume_pending_jobs(&self) -> CoreResult<Vec<JobId>> {
        let stuck = self.db.jobs_in_status(JobStatus::Processing).await?;
        let ids: Vec<JobId> = stuck.iter().map(|j| j.id).collect();
        for id in &ids {
            info!(job_id = %id, "resuming lab upload job left processing at startup");
        }
        Ok(ids)
    }
}
