use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use bulk_match_engine::{
    config::AppConfig,
    engine::{EngineSettings, MatchEngine},
    notify::{LogNotifier, Notifier, WebhookNotifier},
    scorer::HttpScorer,
    store::postgres::{self, PgJobStore},
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

    tracing::info!("Starting bulk match worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Metrics exporter
    match &config.metrics_addr {
        Some(addr) => {
            let addr: std::net::SocketAddr = addr.parse().expect("Invalid metrics address");
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .expect("Failed to install Prometheus exporter");
            tracing::info!(%addr, "Prometheus exporter listening");
        }
        None => {
            let _handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("Failed to install metrics recorder");
        }
    }
    describe_metrics();

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let pool = postgres::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    postgres::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let store = Arc::new(PgJobStore::new(pool));

    let scorer = Arc::new(
        HttpScorer::new(
            &config.scorer_url,
            &config.scorer_api_token,
            Duration::from_secs(config.scorer_timeout_secs),
        )
        .expect("Failed to initialize scorer client"),
    );

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url)),
        None => Arc::new(LogNotifier),
    };

    let engine = MatchEngine::new(store, scorer, notifier, EngineSettings::from(&config));

    tracing::info!(
        max_concurrent_jobs = config.max_concurrent_jobs,
        progress_batch_size = config.progress_batch_size,
        "Worker ready, starting dispatch loop"
    );

    // Main dispatch loop: pick up jobs left pending in the store. The claim
    // step keeps multiple workers from double-processing.
    loop {
        match engine.dispatch_pending(config.dispatch_batch_size).await {
            Ok(0) => {
                tracing::trace!("No pending jobs");
            }
            Ok(count) => {
                tracing::info!(count, "Dispatched pending jobs");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to poll for pending jobs, will retry");
            }
        }
        sleep(Duration::from_millis(config.poll_interval_ms)).await;
    }
}

fn describe_metrics() {
    metrics::describe_counter!("bulk_match_jobs_total", "Total bulk match jobs submitted");
    metrics::describe_counter!(
        "bulk_match_jobs_completed_total",
        "Total bulk match jobs completed"
    );
    metrics::describe_counter!(
        "bulk_match_jobs_failed_total",
        "Total bulk match jobs that failed"
    );
    metrics::describe_counter!(
        "bulk_match_jobs_cancelled_total",
        "Total bulk match jobs cancelled"
    );
    metrics::describe_counter!(
        "bulk_match_pairs_scored_total",
        "Total candidate/job pairs processed"
    );
    metrics::describe_counter!(
        "bulk_match_pair_failures_total",
        "Total pairs whose scoring failed"
    );
    metrics::describe_histogram!(
        "bulk_match_job_duration_seconds",
        "Wall-clock duration of completed jobs"
    );
}
