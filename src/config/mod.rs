use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Scoring service endpoint
    pub scorer_url: String,

    /// Bearer token for the scoring service
    pub scorer_api_token: String,

    /// Webhook for completion notifications. Notifications are logged when unset.
    pub notify_webhook_url: Option<String>,

    /// Bind address for the Prometheus exporter (e.g., "0.0.0.0:9100")
    pub metrics_addr: Option<String>,

    /// Per-request timeout applied to scorer calls, in seconds
    #[serde(default = "default_scorer_timeout_secs")]
    pub scorer_timeout_secs: u64,

    /// Maximum jobs processed concurrently by one engine
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Result rows and counters are flushed to the store every this many pairs
    #[serde(default = "default_progress_batch_size")]
    pub progress_batch_size: usize,

    /// Submissions expanding to more pairs than this are rejected
    #[serde(default = "default_max_total_items")]
    pub max_total_items: u64,

    /// Retries (with doubling backoff) for orchestrator store writes
    #[serde(default = "default_store_write_retries")]
    pub store_write_retries: u32,

    /// Interval between polls for pending jobs, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum pending jobs claimed per poll
    #[serde(default = "default_dispatch_batch_size")]
    pub dispatch_batch_size: usize,
}

fn default_scorer_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_progress_batch_size() -> usize {
    10
}

fn default_max_total_items() -> u64 {
    50_000
}

fn default_store_write_retries() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_dispatch_batch_size() -> usize {
    10
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
