use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{JobKind, JobResult, JobStatus};

/// Response after submitting a single label for verification.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

/// Response after submitting a batch archive.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchSubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total_images: usize,
}

/// Live progress counters for a polling client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressView {
    pub processed_images: i64,
    pub total_images: i64,
}

/// Poller-facing view of a job. While a batch is still processing only the
/// progress counters are exposed; the result payload appears once the job
/// reaches a terminal status.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: ProgressView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Response after retrying a terminal job.
#[derive(Debug, Serialize, Deserialize)]
pub struct RetryResponse {
    pub job_id: Uuid,
    pub retry_of: Uuid,
    pub status: JobStatus,
}

/// Response after a cancellation request.
#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: Uuid,
    pub cancelled: bool,
}

/// Standard error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub error_code: String,
}
