use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::db::{JobStore, StoreError};
use crate::models::job::{
    BatchItemResult, BatchReport, BatchSummary, ItemOutcome, Job, JobInput, JobKind, JobResult,
};
use crate::models::label::VerifyOutcome;
use crate::services::verifier::{VerificationError, Verifier};

/// Tuning knobs for the consumption loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// Sleep between empty polls.
    pub poll_interval: Duration,
    /// Bound on a single Verifier call; a breached timeout fails the
    /// item/job, never the worker.
    pub verify_timeout: Duration,
    /// How long a job may sit claimed before it is assumed orphaned.
    pub reclaim_timeout: Duration,
    /// Claim attempts before an orphaned job is failed instead of requeued.
    pub max_attempts: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker-1".to_string(),
            poll_interval: Duration::from_millis(1000),
            verify_timeout: Duration::from_secs(90),
            reclaim_timeout: Duration::from_secs(300),
            max_attempts: 3,
        }
    }
}

/// The single consumer of the job queue.
///
/// Jobs are claimed FIFO and processed strictly sequentially; within a batch,
/// items run in discovery order with per-item failure isolation. The worker
/// never holds locks of its own: every mutation goes through the store's
/// conditional updates.
pub struct Worker {
    store: JobStore,
    verifier: Arc<dyn Verifier>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(store: JobStore, verifier: Arc<dyn Verifier>, config: WorkerConfig) -> Self {
        Self {
            store,
            verifier,
            config,
        }
    }

    /// Main processing loop; runs until the process is killed.
    ///
    /// A recovery pass runs at startup and then once per reclaim-timeout
    /// window, so jobs orphaned by a crash (or by a failed store write) are
    /// requeued without operator intervention.
    pub async fn run(self) {
        match self.recover().await {
            Ok(recovered) if recovered > 0 => {
                tracing::info!(recovered, "Startup recovery requeued orphaned jobs")
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Startup recovery failed"),
        }

        let mut last_recovery = Instant::now();
        loop {
            if last_recovery.elapsed() >= self.config.reclaim_timeout {
                if let Err(e) = self.recover().await {
                    tracing::error!(error = %e, "Recovery pass failed");
                }
                last_recovery = Instant::now();
            }

            match self.process_next().await {
                Ok(true) => {
                    tracing::debug!("Job processed, checking for next job");
                }
                Ok(false) => {
                    tracing::trace!("No jobs available, sleeping");
                    sleep(self.config.poll_interval).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Store error in processing loop, will retry");
                    sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    /// Requeue or fail jobs whose claim went stale (worker crash mid-job).
    /// Returns the number of jobs returned to `pending`.
    pub async fn recover(&self) -> Result<usize, StoreError> {
        let stuck = self.store.reclaimable(self.config.reclaim_timeout).await?;
        let mut recovered = 0;

        for job in stuck {
            if job.attempt < self.config.max_attempts {
                if self.store.release(job.id).await? {
                    tracing::warn!(
                        job_id = %job.id,
                        attempt = job.attempt,
                        "Requeued orphaned job"
                    );
                    recovered += 1;
                }
            } else {
                self.store
                    .fail(job.id, "exceeded max reclaim attempts")
                    .await?;
                metrics::counter!("verification_jobs_failed").increment(1);
                tracing::warn!(
                    job_id = %job.id,
                    attempt = job.attempt,
                    "Orphaned job exceeded max reclaim attempts"
                );
            }
        }

        Ok(recovered)
    }

    /// Claim and run one job to a terminal state.
    ///
    /// Returns Ok(true) if a job was processed, Ok(false) if the queue was
    /// empty. Verification failures are recorded on the job; only store
    /// errors propagate, leaving the job for the next recovery pass since
    /// its true outcome is unknown.
    pub async fn process_next(&self) -> Result<bool, StoreError> {
        let Some(job) = self
            .store
            .claim_next_pending(&self.config.worker_id)
            .await?
        else {
            return Ok(false);
        };

        tracing::info!(
            job_id = %job.id,
            kind = %job.kind,
            attempt = job.attempt,
            total = job.total_count,
            "Processing verification job"
        );

        match job.kind {
            JobKind::Single => self.run_single(&job).await?,
            JobKind::Batch => self.run_batch(&job).await?,
        }

        if let Ok(depth) = self.store.queue_depth().await {
            metrics::gauge!("verification_queue_depth").set(depth as f64);
        }

        Ok(true)
    }

    async fn run_single(&self, job: &Job) -> Result<(), StoreError> {
        let Some(input) = job.inputs.first() else {
            self.store.fail(job.id, "job has no inputs").await?;
            return Ok(());
        };

        let started = Instant::now();
        match self.verify_item(input).await {
            Ok(outcome) => {
                metrics::histogram!("verification_processing_seconds")
                    .record(started.elapsed().as_secs_f64());
                metrics::counter!("verification_jobs_completed").increment(1);
                tracing::info!(
                    job_id = %job.id,
                    status = ?outcome.status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job completed"
                );
                self.store.complete(job.id, &JobResult::Single(outcome)).await?;
            }
            Err(e) => {
                metrics::counter!("verification_jobs_failed").increment(1);
                tracing::error!(job_id = %job.id, error = %e, "Job failed");
                self.store.fail(job.id, &e.to_string()).await?;
            }
        }
        Ok(())
    }

    /// Batch execution is failure-isolated per item: an error for image i
    /// becomes that item's result and processing continues with i+1.
    /// Progress is persisted after every item so pollers see live counts.
    async fn run_batch(&self, job: &Job) -> Result<(), StoreError> {
        let started = Instant::now();
        let mut results: Vec<BatchItemResult> = Vec::with_capacity(job.inputs.len());

        for (index, input) in job.inputs.iter().enumerate() {
            let image_name = item_name(input);
            let outcome = match self.verify_item(input).await {
                Ok(result) => ItemOutcome::Verified { result },
                Err(e) => {
                    tracing::warn!(
                        job_id = %job.id,
                        image = %image_name,
                        error = %e,
                        "Batch item failed"
                    );
                    ItemOutcome::Error {
                        message: e.to_string(),
                    }
                }
            };
            results.push(BatchItemResult {
                image_path: image_name,
                outcome,
            });

            let partial = JobResult::Batch(BatchReport {
                results: results.clone(),
                summary: None,
            });
            self.store
                .update_progress(job.id, (index + 1) as i64, &partial)
                .await?;
            tracing::debug!(
                job_id = %job.id,
                processed = index + 1,
                total = job.total_count,
                "Batch progress"
            );
        }

        let summary = BatchSummary::from_results(&results, started.elapsed());
        metrics::histogram!("verification_processing_seconds")
            .record(started.elapsed().as_secs_f64());
        metrics::counter!("verification_jobs_completed").increment(1);
        tracing::info!(
            job_id = %job.id,
            compliant = summary.compliant,
            non_compliant = summary.non_compliant,
            errors = summary.errors,
            "Batch completed"
        );

        self.store
            .complete(
                job.id,
                &JobResult::Batch(BatchReport {
                    results,
                    summary: Some(summary),
                }),
            )
            .await?;
        Ok(())
    }

    /// One Verifier call bounded by the per-call timeout. A breached timeout
    /// is an ordinary failure for that item/job, not a worker crash.
    async fn verify_item(&self, input: &JobInput) -> Result<VerifyOutcome, VerificationError> {
        match tokio::time::timeout(
            self.config.verify_timeout,
            self.verifier
                .verify(&input.image_path, input.ground_truth.as_ref()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(VerificationError::Timeout(self.config.verify_timeout)),
        }
    }
}

fn item_name(input: &JobInput) -> String {
    input
        .image_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.image_path.display().to_string())
}
