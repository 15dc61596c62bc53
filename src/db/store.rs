use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{Job, JobInput, JobKind, JobResult, JobStatus};

/// Durable record of job state; the single source of truth for the queue.
///
/// All status transitions are conditional updates keyed on the current
/// status, so the claim invariant (at most one live claim per job) holds in
/// the store itself rather than in caller-side locking.
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

/// Raw row shape; enums and JSON columns are decoded in `into_job`.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    kind: String,
    status: String,
    attempt: i64,
    inputs: String,
    total_count: i64,
    processed_count: i64,
    result: Option<String>,
    error: Option<String>,
    retry_of: Option<String>,
    claimed_by: Option<String>,
    created_at: String,
    claimed_at: Option<String>,
    completed_at: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Result<Job, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: self.id.clone(),
            reason,
        };

        let inputs: Vec<JobInput> =
            serde_json::from_str(&self.inputs).map_err(|e| corrupt(format!("inputs: {e}")))?;
        let result: Option<JobResult> = match &self.result {
            Some(json) => {
                Some(serde_json::from_str(json).map_err(|e| corrupt(format!("result: {e}")))?)
            }
            None => None,
        };

        Ok(Job {
            id: Uuid::parse_str(&self.id).map_err(|e| corrupt(format!("id: {e}")))?,
            kind: JobKind::from_str(&self.kind).map_err(|e| corrupt(format!("kind: {e}")))?,
            status: JobStatus::from_str(&self.status)
                .map_err(|e| corrupt(format!("status: {e}")))?,
            inputs,
            attempt: self.attempt,
            processed_count: self.processed_count,
            total_count: self.total_count,
            result,
            error: self.error,
            retry_of: match &self.retry_of {
                Some(raw) => {
                    Some(Uuid::parse_str(raw).map_err(|e| corrupt(format!("retry_of: {e}")))?)
                }
                None => None,
            },
            claimed_by: self.claimed_by,
            created_at: parse_ts(&self.created_at).map_err(corrupt)?,
            claimed_at: self.claimed_at.as_deref().map(parse_ts).transpose().map_err(corrupt)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_ts)
                .transpose()
                .map_err(corrupt)?,
        })
    }
}

/// Fixed-precision RFC 3339 so timestamp columns compare lexicographically.
fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("timestamp {raw:?}: {e}"))
}

impl JobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new job in `pending`. `retry_of` links a retried job back to
    /// its source for auditing; it never affects execution.
    pub async fn create(
        &self,
        kind: JobKind,
        inputs: &[JobInput],
        retry_of: Option<Uuid>,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let inputs_json = serde_json::to_string(inputs).map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("inputs: {e}"),
        })?;

        sqlx::query(
            r#"
            INSERT INTO verify_jobs (id, kind, status, attempt, inputs, total_count,
                                     processed_count, retry_of, created_at)
            VALUES (?, ?, 'pending', 0, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(kind.to_string())
        .bind(inputs_json)
        .bind(inputs.len() as i64)
        .bind(retry_of.map(|u| u.to_string()))
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Atomically claim the oldest pending job for `worker_id`.
    ///
    /// A single conditional UPDATE: selection and transition happen in one
    /// statement, so no two claims can ever succeed for the same job even if
    /// more consumers are added later.
    pub async fn claim_next_pending(&self, worker_id: &str) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE verify_jobs
            SET status = 'processing',
                attempt = attempt + 1,
                claimed_at = ?,
                claimed_by = ?
            WHERE id = (
                SELECT id FROM verify_jobs
                WHERE status = 'pending'
                ORDER BY created_at ASC, rowid ASC
                LIMIT 1
            )
            AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(now_ts())
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    /// Persist live progress for a running job. Guarded on `processing` so a
    /// stale writer cannot touch a job it no longer owns.
    pub async fn update_progress(
        &self,
        id: Uuid,
        processed_count: i64,
        partial: &JobResult,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(partial).map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("result: {e}"),
        })?;

        let updated = sqlx::query(
            r#"
            UPDATE verify_jobs
            SET processed_count = ?, result = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(processed_count)
        .bind(json)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            tracing::warn!(job_id = %id, "Progress update ignored: job not processing");
        }
        Ok(())
    }

    /// Terminal transition `processing -> completed`.
    pub async fn complete(&self, id: Uuid, result: &JobResult) -> Result<(), StoreError> {
        let json = serde_json::to_string(result).map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("result: {e}"),
        })?;

        let updated = sqlx::query(
            r#"
            UPDATE verify_jobs
            SET status = 'completed', result = ?, error = NULL,
                processed_count = total_count, completed_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(json)
        .bind(now_ts())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            tracing::warn!(job_id = %id, "Complete ignored: job not processing");
        }
        Ok(())
    }

    /// Terminal transition `processing -> failed`. Any partial result already
    /// persisted (batch items finished before the failure) is kept.
    pub async fn fail(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE verify_jobs
            SET status = 'failed', error = ?, completed_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(error)
        .bind(now_ts())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            tracing::warn!(job_id = %id, "Fail ignored: job not processing");
        }
        Ok(())
    }

    /// Cancel a job that has not been claimed yet. Returns whether the
    /// cancellation took effect; claimed jobs run to completion.
    pub async fn cancel(&self, id: Uuid) -> Result<bool, StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE verify_jobs
            SET status = 'cancelled', completed_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(now_ts())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM verify_jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(JobRow::into_job).transpose()
    }

    /// Jobs not yet in a terminal state.
    pub async fn queue_depth(&self) -> Result<i64, StoreError> {
        let depth: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM verify_jobs WHERE status IN ('pending', 'processing')",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(depth)
    }

    /// Jobs stuck in `processing` with a claim older than `older_than` —
    /// the claiming worker is assumed to have crashed.
    pub async fn reclaimable(&self, older_than: Duration) -> Result<Vec<Job>, StoreError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::zero());

        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM verify_jobs
            WHERE status = 'processing' AND claimed_at < ?
            ORDER BY claimed_at ASC
            "#,
        )
        .bind(fmt_ts(cutoff))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Return an orphaned `processing` job to `pending` for re-execution.
    /// The attempt counter is deliberately preserved so reclaim stays bounded.
    pub async fn release(&self, id: Uuid) -> Result<bool, StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE verify_jobs
            SET status = 'pending', claimed_at = NULL, claimed_by = NULL
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt job record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}
