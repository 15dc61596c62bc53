use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::models::label::ExtractedLabelFields;

const EXTRACTION_PROMPT: &str = concat!(
    "Analyze this beverage label image and extract the following fields as JSON: ",
    "brand_name, class_type (e.g. Wine, Distilled Spirits, Malt Beverage), ",
    "abv (alcohol by volume as a number), net_contents, ",
    "country_of_origin, government_warning. ",
    "Return ONLY valid JSON with these exact field names."
);

/// Client for the Cloudflare Workers AI vision model used for OCR.
///
/// Latency is highly variable (sub-second to over a minute); callers bound
/// each call with their own timeout.
pub struct WorkersAiClient {
    http: Client,
    account_id: String,
    api_token: String,
    model: String,
}

#[derive(Deserialize)]
struct WorkersAiResponse {
    result: WorkersAiResult,
}

#[derive(Deserialize)]
struct WorkersAiResult {
    description: String,
}

impl WorkersAiClient {
    pub fn new(account_id: &str, api_token: &str, model: &str) -> Result<Self, OcrError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(OcrError::Http)?;

        Ok(Self {
            http,
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
            model: model.to_string(),
        })
    }

    /// Send a label image to the vision model and extract structured fields.
    pub async fn extract_label_fields(
        &self,
        image_bytes: &[u8],
    ) -> Result<ExtractedLabelFields, OcrError> {
        let url = format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/ai/run/{}",
            self.account_id, self.model
        );

        let request_body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image_bytes),
            "prompt": EXTRACTION_PROMPT,
            "max_tokens": 512
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&request_body)
            .send()
            .await
            .map_err(OcrError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(OcrError::Backend {
                status: status.as_u16(),
                detail,
            });
        }

        let parsed: WorkersAiResponse = response.json().await.map_err(OcrError::Http)?;
        let payload = strip_code_fences(&parsed.result.description);
        serde_json::from_str(payload).map_err(OcrError::Parse)
    }
}

/// Vision models frequently wrap their JSON answer in a markdown code fence.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OCR backend returned status {status}: {detail}")]
    Backend { status: u16, detail: String },

    #[error("failed to parse model response as structured fields: {0}")]
    Parse(#[from] serde_json::Error),
}
