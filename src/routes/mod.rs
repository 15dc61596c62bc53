pub mod health;
pub mod metrics;
pub mod verify;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::verification::ErrorResponse;
use crate::services::queue::QueueError;

/// Maps service errors onto HTTP responses with a JSON error body.
pub enum ApiError {
    Queue(QueueError),
    BadRequest(String),
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self::Queue(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, detail) = match &self {
            Self::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "bad_request", detail.clone())
            }
            Self::Queue(err) => {
                let (status, code) = match err {
                    QueueError::Submission(_) => (StatusCode::BAD_REQUEST, "invalid_submission"),
                    QueueError::NotFound(_) => (StatusCode::NOT_FOUND, "job_not_found"),
                    QueueError::InvalidTransition { .. } => {
                        (StatusCode::CONFLICT, "invalid_transition")
                    }
                    QueueError::Store(_) | QueueError::Join(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
                    }
                };
                (status, code, err.to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %detail, "Request failed");
        }

        (
            status,
            Json(ErrorResponse {
                detail,
                error_code: error_code.to_string(),
            }),
        )
            .into_response()
    }
}
