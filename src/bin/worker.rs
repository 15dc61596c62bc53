use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ttb_label_verifier::{
    config::AppConfig,
    db::{self, JobStore},
    services::{ocr::WorkersAiClient, verifier::OcrVerifier},
    worker::{Worker, WorkerConfig},
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting label verification worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Open the shared job store
    std::fs::create_dir_all(&config.data_dir).expect("Failed to create data directory");
    tracing::info!("Opening job store at {}", config.database_url);
    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to open job store database");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let store = JobStore::new(pool);

    // Initialize the OCR-backed verifier
    tracing::info!(model = %config.ocr_model, "Initializing Workers AI client");
    let ocr = WorkersAiClient::new(&config.cf_account_id, &config.cf_api_token, &config.ocr_model)
        .expect("Failed to initialize Workers AI client");
    let verifier = Arc::new(OcrVerifier::new(ocr));

    let worker = Worker::new(
        store,
        verifier,
        WorkerConfig {
            worker_id: config.worker_id.clone(),
            poll_interval: config.poll_interval(),
            verify_timeout: config.verify_timeout(),
            reclaim_timeout: config.reclaim_timeout(),
            max_attempts: config.max_attempts,
        },
    );

    tracing::info!(
        worker_id = %config.worker_id,
        poll_interval_ms = config.poll_interval_ms,
        "Worker ready, starting job processing loop"
    );

    worker.run().await;
}
