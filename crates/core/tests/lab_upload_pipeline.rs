//! End-to-end coverage of the lab upload job pipeline (`spec.md` §4.3,
//! scenario 3 in §8): one bad row among several good ones terminates the
//! job `needs_review` with every good row persisted and the bad one
//! recorded in `result_payload.failed_biomarkers`, never failing the whole
//! upload.

use std::sync::Arc;
use vitalcore_core::catalog::{seed_snapshot, Catalog};
use vitalcore_core::db::{connect, init_db, Db};
use vitalcore_core::labs::LabUploadPipeline;
use vitalcore_shared::ids::UserId;
use vitalcore_shared::labjob::JobStatus;

async fn test_db() -> Db {
    let pool = connect("sqlite::memory:").await.expect("open in-memory sqlite");
    init_db(&pool).await.expect("run migrations");
    Db::new(pool, std::time::Duration::from_secs(5))
}

fn object_store_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("vitalcore-lab-test-{}", uuid::Uuid::new_v4()))
}

#[tokio::test]
async fn one_bad_row_yields_needs_review_with_the_rest_persisted() {
    let db = Arc::new(test_db().await);
    let catalog = Arc::new(Catalog::new(seed_snapshot()));

    let dir = object_store_dir();
    std::env::set_var("OBJECT_STORE_BASE_PATH", dir.to_str().unwrap());
    let object_store = vitalcore_shared::vendor::find_object_store("local").expect("local object store registered");
    let extractor = vitalcore_shared::vendor::find_lab_extractor("mock").expect("mock extractor registered");

    let pipeline = LabUploadPipeline {
        db: db.clone(),
        catalog,
        extractor,
        object_store,
        dedup_epsilon_fraction: 0.005,
    };

    let doc = b"DATE:2024-01-15\nLAB:Test Lab\nglucose|90|mg/dL\nferritin|12|ng/mL\nunobtainium|5|mg/dL\n";
    let user = UserId::random();
    let job = pipeline.accept_upload(user, doc, "application/pdf").await.expect("accept upload");

    pipeline.process(job.id).await.expect("pipeline run does not itself error on per-row failures");

    let finished = pipeline.get_job_status(job.id).await.expect("job exists");
    assert_eq!(finished.status, JobStatus::NeedsReview);
    assert_eq!(finished.result_payload.persisted_measurement_count, 2);
    assert_eq!(finished.result_payload.failed_biomarkers.len(), 1);
    assert_eq!(finished.result_payload.failed_biomarkers[0].raw_name, "unobtainium");

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn invalid_test_date_fails_the_whole_job() {
    let db = Arc::new(test_db().await);
    let catalog = Arc::new(Catalog::new(seed_snapshot()));

    let dir = object_store_dir();
    std::env::set_var("OBJECT_STORE_BASE_PATH", dir.to_str().unwrap());
    let object_store = vitalcore_shared::vendor::find_object_store("local").expect("local object store registered");
    let extractor = vitalcore_shared::vendor::find_lab_extractor("mock").expect("mock extractor registered");

    let pipeline = LabUploadPipeline {
        db: db.clone(),
        catalog,
        extractor,
        object_store,
        dedup_epsilon_fraction: 0.005,
    };

    // more than 10 years in the past, per `spec.md` §4.3 step 4.
    let doc = b"DATE:1990-01-01\nLAB:Test Lab\nglucose|90|mg/dL\n";
    let user = UserId::random();
    let job = pipeline.accept_upload(user, doc, "application/pdf").await.expect("accept upload");

    pipeline.process(job.id).await.expect("pipeline surfaces failure via job status, not an Err");

    let finished = pipeline.get_job_status(job.id).await.expect("job exists");
    assert_eq!(finished.status, JobStatus::Failed);
    assert!(finished.error_details.is_some());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn rejects_uploads_over_ten_mebibytes() {
    let db = Arc::new(test_db().await);
    let catalog = Arc::new(Catalog::new(seed_snapshot()));
    let dir = object_store_dir();
    std::env::set_var("OBJECT_STORE_BASE_PATH", dir.to_str().unwrap());
    let object_store = vitalcore_shared::vendor::find_object_store("local").expect("local object store registered");
    let extractor = vitalcore_shared::vendor::find_lab_extractor("mock").expect("mock extractor registered");
    let pipeline = LabUploadPipeline { db, catalog, extractor, object_store, dedup_epsilon_fraction: 0.005 };

    let oversized = vec![0u8; 10 * 1024 * 1024 + 1];
    let result = pipeline.accept_upload(UserId::random(), &oversized, "application/pdf").await;
    assert!(result.is_err());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}
