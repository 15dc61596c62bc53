use uuid::Uuid;

use crate::db::{JobStore, StoreError};
use crate::models::job::{Job, JobInput, JobKind};
use crate::models::label::GroundTruth;
use crate::models::verification::{JobView, ProgressView};
use crate::services::staging::{Staging, SubmissionError};

/// Request-facing façade over the job store: submissions, polling, retry
/// and cancellation. The HTTP layer talks only to this type.
pub struct QueueManager {
    store: JobStore,
    staging: Staging,
}

impl QueueManager {
    pub fn new(store: JobStore, staging: Staging) -> Self {
        Self { store, staging }
    }

    /// Stage a single uploaded image and enqueue a job for it.
    pub async fn submit_single(
        &self,
        image: Vec<u8>,
        filename: &str,
        ground_truth: Option<GroundTruth>,
    ) -> Result<Uuid, QueueError> {
        let staging = self.staging.clone();
        let name = filename.to_string();
        let image_path =
            tokio::task::spawn_blocking(move || staging.stage_single(&image, &name)).await??;

        let input = JobInput {
            image_path,
            ground_truth,
        };
        let job_id = self
            .store
            .create(JobKind::Single, std::slice::from_ref(&input), None)
            .await?;

        metrics::counter!("verification_jobs_total").increment(1);
        self.refresh_depth_gauge().await;
        tracing::info!(job_id = %job_id, filename = %filename, "Enqueued single verification job");
        Ok(job_id)
    }

    /// Extract a batch archive, discover its images and enqueue one batch
    /// job covering all of them. Rejected before any job is created if the
    /// archive is invalid or contains no images.
    pub async fn submit_batch(&self, archive: Vec<u8>) -> Result<(Uuid, usize), QueueError> {
        let staging = self.staging.clone();
        let inputs =
            tokio::task::spawn_blocking(move || staging.stage_batch(&archive)).await??;

        let total_images = inputs.len();
        let job_id = self.store.create(JobKind::Batch, &inputs, None).await?;

        metrics::counter!("verification_jobs_total").increment(1);
        self.refresh_depth_gauge().await;
        tracing::info!(job_id = %job_id, total_images, "Enqueued batch verification job");
        Ok((job_id, total_images))
    }

    /// Poller-facing job view. Batch results are withheld until the job is
    /// terminal; progress counters are always live.
    pub async fn status(&self, job_id: Uuid) -> Result<JobView, QueueError> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or(QueueError::NotFound(job_id))?;
        Ok(job_view(job))
    }

    /// Re-submit a terminal job as a brand new one. The original record is
    /// never mutated; the new job carries `retry_of` as an audit link.
    pub async fn retry(&self, job_id: Uuid) -> Result<Uuid, QueueError> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or(QueueError::NotFound(job_id))?;

        if !job.status.is_terminal() {
            return Err(QueueError::InvalidTransition {
                id: job_id,
                status: job.status,
            });
        }

        let new_id = self.store.create(job.kind, &job.inputs, Some(job_id)).await?;
        metrics::counter!("verification_jobs_total").increment(1);
        self.refresh_depth_gauge().await;
        tracing::info!(job_id = %new_id, retry_of = %job_id, "Enqueued retry job");
        Ok(new_id)
    }

    /// Cancel a job that has not been claimed yet. Returns whether the
    /// cancellation took effect; a claimed job runs to completion.
    pub async fn cancel(&self, job_id: Uuid) -> Result<bool, QueueError> {
        if self.store.get(job_id).await?.is_none() {
            return Err(QueueError::NotFound(job_id));
        }

        let cancelled = self.store.cancel(job_id).await?;
        if cancelled {
            self.refresh_depth_gauge().await;
            tracing::info!(job_id = %job_id, "Job cancelled");
        }
        Ok(cancelled)
    }

    /// Jobs not yet in a terminal state.
    pub async fn queue_depth(&self) -> Result<i64, QueueError> {
        Ok(self.store.queue_depth().await?)
    }

    async fn refresh_depth_gauge(&self) {
        if let Ok(depth) = self.store.queue_depth().await {
            metrics::gauge!("verification_queue_depth").set(depth as f64);
        }
    }
}

fn job_view(job: Job) -> JobView {
    let terminal = job.status.is_terminal();
    JobView {
        job_id: job.id,
        kind: job.kind,
        status: job.status,
        progress: ProgressView {
            processed_images: job.processed_count,
            total_images: job.total_count,
        },
        result: if terminal { job.result } else { None },
        error: job.error,
        retry_of: job.retry_of,
        created_at: job.created_at,
        completed_at: job.completed_at,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {id} is {status}; operation requires a terminal job")]
    InvalidTransition {
        id: Uuid,
        status: crate::models::job::JobStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("staging task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
