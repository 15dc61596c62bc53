use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the worker.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// SQLite job store shared by the API and worker processes.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Root directory for the upload and batch staging areas.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Cloudflare account ID
    pub cf_account_id: String,

    /// Cloudflare Workers AI API token
    pub cf_api_token: String,

    /// Vision model used for label OCR
    #[serde(default = "default_ocr_model")]
    pub ocr_model: String,

    /// Maximum number of images accepted in one batch archive
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Bound on a single verification call
    #[serde(default = "default_verify_timeout_seconds")]
    pub verify_timeout_seconds: u64,

    /// Worker sleep between empty queue polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Age after which a claimed job is assumed orphaned
    #[serde(default = "default_reclaim_timeout_seconds")]
    pub reclaim_timeout_seconds: u64,

    /// Claim attempts before an orphaned job is permanently failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    /// Identifier recorded on claims made by this worker process
    #[serde(default = "default_worker_id")]
    pub worker_id: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_database_url() -> String {
    "sqlite://data/jobs.db".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_ocr_model() -> String {
    "@cf/llava-hf/llava-1.5-7b-hf".to_string()
}

fn default_max_batch_size() -> usize {
    50
}

fn default_verify_timeout_seconds() -> u64 {
    90
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_reclaim_timeout_seconds() -> u64 {
    300
}

fn default_max_attempts() -> i64 {
    3
}

fn default_worker_id() -> String {
    "worker-1".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_seconds)
    }

    pub fn reclaim_timeout(&self) -> Duration {
        Duration::from_secs(self.reclaim_timeout_seconds)
    }
}
