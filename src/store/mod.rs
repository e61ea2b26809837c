use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::job::{BulkMatchJob, JobStatus, ResultsSummary};
use crate::models::result::BulkMatchResult;

pub mod memory;
pub mod postgres;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("unrecognized {column} value in store: {value}")]
    BadColumn {
        column: &'static str,
        value: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Counter snapshot persisted alongside a batch of result rows.
///
/// `progress` is always recomputed from the counters by the caller, never
/// incremented independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressCounters {
    pub processed_items: u64,
    pub successful_matches: u64,
    pub failed_items: u64,
    pub progress: u8,
}

/// Outcome of the atomic `pending -> processing` claim.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// The job was pending and is now processing.
    Claimed(BulkMatchJob),
    /// The job was cancelled before processing began.
    Cancelled(BulkMatchJob),
    /// Already claimed by another dispatcher, or terminal.
    Unavailable,
}

/// Persistence seam for jobs and per-pair result rows.
///
/// Result rows and counters move together: `record_batch` applies both in one
/// atomic step, so the row count for a job equals `processed_items` at every
/// observable point.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &BulkMatchJob) -> Result<(), StoreError>;

    async fn fetch_job(&self, id: Uuid) -> Result<Option<BulkMatchJob>, StoreError>;

    /// Atomically transition a pending job to processing, stamping
    /// `started_at`. Safe to race from multiple dispatchers.
    async fn claim_job(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Append result rows and update counters in one atomic step. Returns the
    /// persisted status so the caller can observe an external cancellation.
    async fn record_batch(
        &self,
        id: Uuid,
        results: &[BulkMatchResult],
        counters: ProgressCounters,
    ) -> Result<JobStatus, StoreError>;

    /// Transition a processing job to completed. Returns false when the job
    /// was no longer processing (e.g. cancelled concurrently).
    async fn complete_job(
        &self,
        id: Uuid,
        summary: &ResultsSummary,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Terminalize a non-terminal job as failed.
    async fn fail_job(
        &self,
        id: Uuid,
        error_message: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Request cancellation. Returns false when the job is already terminal.
    async fn cancel_job(&self, id: Uuid, completed_at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Attach the partial-results summary to an already-cancelled job.
    async fn attach_summary(&self, id: Uuid, summary: &ResultsSummary) -> Result<(), StoreError>;

    /// Result rows for a job in processing order.
    async fn list_results(
        &self,
        job_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<BulkMatchResult>, StoreError>;

    /// Oldest pending jobs, for dispatch recovery.
    async fn pending_jobs(&self, limit: usize) -> Result<Vec<BulkMatchJob>, StoreError>;
}
