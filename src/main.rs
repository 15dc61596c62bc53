mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use db::JobStore;
use services::queue::QueueManager;
use services::staging::Staging;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing ttb-label-verifier server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "verification_processing_seconds",
        "Time to process a label verification job"
    );
    metrics::describe_counter!(
        "verification_jobs_total",
        "Total verification jobs submitted"
    );
    metrics::describe_counter!(
        "verification_jobs_completed",
        "Total verification jobs completed"
    );
    metrics::describe_counter!(
        "verification_jobs_failed",
        "Total verification jobs that failed"
    );
    metrics::describe_gauge!(
        "verification_queue_depth",
        "Current number of jobs not yet in a terminal state"
    );

    // Initialize staging areas for uploads and extracted batches; this also
    // creates the data directory the job store database lives in.
    let staging = Staging::new(&config.data_dir, config.max_batch_size)
        .expect("Failed to create staging directories");

    // Initialize the SQLite job store
    tracing::info!("Opening job store at {}", config.database_url);
    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to open job store database");

    tracing::info!("Running database migrations");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let store = JobStore::new(pool);

    let queue = QueueManager::new(store.clone(), staging);
    let state = AppState::new(store, queue);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/verify", post(routes::verify::submit_verification))
        .route("/api/v1/verify/batch", post(routes::verify::submit_batch))
        .route(
            "/api/v1/verify/{job_id}",
            get(routes::verify::get_job_status).delete(routes::verify::cancel_job),
        )
        .route("/api/v1/verify/{job_id}/retry", post(routes::verify::retry_job))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(50 * 1024 * 1024)); // 50 MB limit for batch archives

    tracing::info!("Starting ttb-label-verifier on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
