//! Shared harness for queue and worker integration tests.

use async_trait::async_trait;
use chrono::SecondsFormat;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use ttb_label_verifier::db::{self, JobStore};
use ttb_label_verifier::models::job::JobStatus;
use ttb_label_verifier::models::label::{
    ComplianceStatus, ExtractedLabelFields, GroundTruth, ValidationLevel, VerifyOutcome,
};
use ttb_label_verifier::services::queue::QueueManager;
use ttb_label_verifier::services::staging::Staging;
use ttb_label_verifier::services::verifier::{VerificationError, Verifier};
use ttb_label_verifier::worker::{Worker, WorkerConfig};

/// Fresh in-memory job store. A single connection is required: every
/// connection to an in-memory SQLite database sees its own database.
pub async fn test_store() -> JobStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    db::run_migrations(&pool).await.expect("run migrations");
    JobStore::new(pool)
}

/// Scriptable stand-in for the OCR verification pipeline.
pub struct MockVerifier {
    calls: AtomicUsize,
    delay: Option<Duration>,
    failures: Vec<String>,
}

impl MockVerifier {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: None,
            failures: Vec::new(),
        }
    }

    /// Fail for images whose file name matches one of `names`.
    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            failures: names.iter().map(|n| n.to_string()).collect(),
            ..Self::new()
        }
    }

    /// Sleep for `delay` before answering, to exercise the call timeout.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Verifier for MockVerifier {
    async fn verify(
        &self,
        image_path: &Path,
        ground_truth: Option<&GroundTruth>,
    ) -> Result<VerifyOutcome, VerificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failures.contains(&name) {
            return Err(VerificationError::Decode {
                path: image_path.to_path_buf(),
            });
        }

        Ok(compliant_outcome(ground_truth, Some(name)))
    }
}

pub fn compliant_outcome(gt: Option<&GroundTruth>, image_path: Option<String>) -> VerifyOutcome {
    VerifyOutcome {
        status: ComplianceStatus::Compliant,
        validation_level: if gt.is_some() {
            ValidationLevel::FullValidation
        } else {
            ValidationLevel::StructuralOnly
        },
        extracted_fields: ExtractedLabelFields {
            brand_name: "Stone Creek Vineyards".to_string(),
            class_type: "Wine".to_string(),
            abv: 13.5,
            net_contents: "750 mL".to_string(),
            country_of_origin: None,
            government_warning: Some("GOVERNMENT WARNING: ...".to_string()),
        },
        violations: Vec::new(),
        warnings: Vec::new(),
        processing_time_seconds: 0.01,
        image_path,
    }
}

/// Queue manager and worker wired over a shared store and temp staging dirs.
pub struct TestHarness {
    pub store: JobStore,
    pub queue: QueueManager,
    pub worker: Worker,
    pub verifier: Arc<MockVerifier>,
    _data_dir: tempfile::TempDir,
}

pub fn fast_config() -> WorkerConfig {
    WorkerConfig {
        worker_id: "test-worker".to_string(),
        poll_interval: Duration::from_millis(10),
        verify_timeout: Duration::from_millis(500),
        reclaim_timeout: Duration::from_millis(200),
        max_attempts: 3,
    }
}

pub async fn harness() -> TestHarness {
    harness_with(MockVerifier::new(), fast_config()).await
}

pub async fn harness_with(verifier: MockVerifier, config: WorkerConfig) -> TestHarness {
    let store = test_store().await;
    let data_dir = tempfile::tempdir().expect("create temp data dir");
    let staging = Staging::new(data_dir.path(), 50).expect("create staging dirs");
    let queue = QueueManager::new(store.clone(), staging);
    let verifier = Arc::new(verifier);
    let worker = Worker::new(store.clone(), verifier.clone(), config);

    TestHarness {
        store,
        queue,
        worker,
        verifier,
        _data_dir: data_dir,
    }
}

/// Backdate a job's claim so it looks orphaned to the recovery pass.
pub async fn backdate_claim(store: &JobStore, job_id: Uuid, age: Duration) {
    let stale = (chrono::Utc::now() - chrono::Duration::from_std(age).expect("duration"))
        .to_rfc3339_opts(SecondsFormat::Micros, true);
    sqlx::query("UPDATE verify_jobs SET claimed_at = ? WHERE id = ?")
        .bind(stale)
        .bind(job_id.to_string())
        .execute(store.pool())
        .await
        .expect("backdate claim");
}

/// Poll job status until it reaches a terminal state (bounded wait).
pub async fn wait_for_terminal(store: &JobStore, job_id: Uuid) -> JobStatus {
    for _ in 0..200 {
        let job = store
            .get(job_id)
            .await
            .expect("get job")
            .expect("job exists");
        if job.status.is_terminal() {
            return job.status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not reach a terminal state in time");
}
