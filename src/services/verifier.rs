use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::models::label::{GroundTruth, VerifyOutcome};
use crate::services::ocr::{OcrError, WorkersAiClient};
use crate::services::validation;

/// The verification capability consumed by the worker.
///
/// Implementations may be slow (a vision-model OCR call can take over a
/// minute) and may fail outright; the worker bounds every call with a
/// timeout and records failures on the job instead of crashing.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        image_path: &Path,
        ground_truth: Option<&GroundTruth>,
    ) -> Result<VerifyOutcome, VerificationError>;
}

/// Production verifier: staged file -> vision-model OCR -> two-tier
/// field validation.
pub struct OcrVerifier {
    ocr: WorkersAiClient,
}

impl OcrVerifier {
    pub fn new(ocr: WorkersAiClient) -> Self {
        Self { ocr }
    }
}

#[async_trait]
impl Verifier for OcrVerifier {
    async fn verify(
        &self,
        image_path: &Path,
        ground_truth: Option<&GroundTruth>,
    ) -> Result<VerifyOutcome, VerificationError> {
        let started = Instant::now();

        let image_bytes =
            tokio::fs::read(image_path)
                .await
                .map_err(|source| VerificationError::ImageRead {
                    path: image_path.to_path_buf(),
                    source,
                })?;

        image::guess_format(&image_bytes).map_err(|_| VerificationError::Decode {
            path: image_path.to_path_buf(),
        })?;

        let extracted = self.ocr.extract_label_fields(&image_bytes).await?;
        tracing::debug!(
            image = %image_path.display(),
            brand = %extracted.brand_name,
            abv = extracted.abv,
            "OCR extraction complete"
        );

        let image_name = image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        Ok(validation::evaluate(
            &extracted,
            ground_truth,
            started.elapsed(),
            image_name,
        ))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("failed to read image {}: {source}", path.display())]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported or corrupt image data: {}", path.display())]
    Decode { path: PathBuf },

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error("verification timed out after {0:?}")]
    Timeout(Duration),
}
