use axum::extract::{Multipart, Path, State};
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::JobStatus;
use crate::models::label::GroundTruth;
use crate::models::verification::{
    BatchSubmitResponse, CancelResponse, JobView, RetryResponse, SubmitResponse,
};
use crate::routes::ApiError;

/// POST /api/v1/verify — submit one label image for async verification.
///
/// Multipart fields: `image` (required), `ground_truth` (optional JSON
/// text with expected label fields).
pub async fn submit_verification(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, ApiError> {
    let mut image: Option<(Vec<u8>, String)> = None;
    let mut ground_truth: Option<GroundTruth> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("image") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read image: {e}")))?;
                image = Some((data.to_vec(), filename));
            }
            Some("ground_truth") => {
                let text = field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("failed to read ground_truth: {e}"))
                })?;
                ground_truth = Some(parse_ground_truth(&text)?);
            }
            _ => {}
        }
    }

    let (data, filename) =
        image.ok_or_else(|| ApiError::BadRequest("missing 'image' field".to_string()))?;

    let job_id = state.queue.submit_single(data, &filename, ground_truth).await?;

    Ok(Json(SubmitResponse {
        job_id,
        status: JobStatus::Pending,
        message: "Label submitted for verification".to_string(),
    }))
}

/// POST /api/v1/verify/batch — submit a ZIP archive of label images.
pub async fn submit_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchSubmitResponse>, ApiError> {
    let mut archive: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if matches!(field.name(), Some("archive") | Some("batch_file")) {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read archive: {e}")))?;
            archive = Some(data.to_vec());
        }
    }

    let data =
        archive.ok_or_else(|| ApiError::BadRequest("missing 'archive' field".to_string()))?;

    let (job_id, total_images) = state.queue.submit_batch(data).await?;

    Ok(Json(BatchSubmitResponse {
        job_id,
        status: JobStatus::Pending,
        total_images,
    }))
}

/// GET /api/v1/verify/{job_id} — poll job status and results.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobView>, ApiError> {
    let view = state.queue.status(job_id).await?;
    Ok(Json(view))
}

/// POST /api/v1/verify/{job_id}/retry — re-submit a terminal job.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<RetryResponse>, ApiError> {
    let new_id = state.queue.retry(job_id).await?;
    Ok(Json(RetryResponse {
        job_id: new_id,
        retry_of: job_id,
        status: JobStatus::Pending,
    }))
}

/// DELETE /api/v1/verify/{job_id} — cancel a job that is still pending.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = state.queue.cancel(job_id).await?;
    Ok(Json(CancelResponse { job_id, cancelled }))
}

fn parse_ground_truth(text: &str) -> Result<GroundTruth, ApiError> {
    let gt: GroundTruth = serde_json::from_str(text)
        .map_err(|e| ApiError::BadRequest(format!("invalid ground_truth JSON: {e}")))?;
    gt.validate()
        .map_err(|e| ApiError::BadRequest(format!("invalid ground_truth: {e}")))?;
    Ok(gt)
}
