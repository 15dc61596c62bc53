use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::label::{ComplianceStatus, GroundTruth, VerifyOutcome};

/// Status of a verification job in the async queue.
///
/// Valid paths: `pending -> processing -> {completed, failed}` and
/// `pending -> cancelled`. A claimed job is never cancelled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses never change again; only terminal jobs may be retried.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Kind of work a job carries: one image or a batch of them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    Single,
    Batch,
}

/// One unit of input: a staged image plus optional expected fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInput {
    pub image_path: PathBuf,
    pub ground_truth: Option<GroundTruth>,
}

/// A label verification job. The only persistent entity in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub inputs: Vec<JobInput>,
    /// Claim attempts so far; bounds automatic reclaim after crashes.
    pub attempt: i64,
    pub processed_count: i64,
    pub total_count: i64,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    /// Audit link to the job this one was retried from.
    pub retry_of: Option<Uuid>,
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Result payload stored on a job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobResult {
    Single(VerifyOutcome),
    Batch(BatchReport),
}

/// Per-item results for a batch job. `summary` stays `None` while the batch
/// is still running, so partial progress writes carry completed items only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<BatchItemResult>,
    pub summary: Option<BatchSummary>,
}

/// Outcome of one image inside a batch. Item failures are isolated: an
/// error entry here never fails the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub image_path: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Verified { result: VerifyOutcome },
    Error { message: String },
}

/// Aggregate statistics for a finished batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub compliant: usize,
    pub non_compliant: usize,
    pub errors: usize,
    pub total_processing_time_seconds: f64,
}

impl BatchSummary {
    pub fn from_results(results: &[BatchItemResult], elapsed: Duration) -> Self {
        let mut compliant = 0;
        let mut non_compliant = 0;
        let mut errors = 0;
        let mut item_time = 0.0;

        for item in results {
            match &item.outcome {
                ItemOutcome::Verified { result } => {
                    item_time += result.processing_time_seconds;
                    match result.status {
                        ComplianceStatus::Compliant => compliant += 1,
                        ComplianceStatus::NonCompliant => non_compliant += 1,
                        ComplianceStatus::PartialValidation => {}
                    }
                }
                ItemOutcome::Error { .. } => errors += 1,
            }
        }

        // Item times exclude errored entries; fall back to wall time when
        // every item errored.
        if item_time == 0.0 {
            item_time = elapsed.as_secs_f64();
        }

        Self {
            total: results.len(),
            compliant,
            non_compliant,
            errors,
            total_processing_time_seconds: item_time,
        }
    }
}
