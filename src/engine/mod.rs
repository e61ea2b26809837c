//! Bulk match engine: job submission, dispatch, cancellation and lookups.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use garde::Validate;
use metrics::counter;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::job::BulkMatchJob;
use crate::models::result::BulkMatchResult;
use crate::models::submission::JobSubmission;
use crate::notify::Notifier;
use crate::scorer::Scorer;
use crate::store::{JobStore, StoreError};

mod orchestrator;

use orchestrator::Orchestrator;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid submission: {0}")]
    Invalid(#[from] garde::Report),

    #[error("selection expands to {total} pairs, exceeding the cap of {cap}")]
    TooLarge { total: u64, cap: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Engine tuning knobs, lifted out of [`AppConfig`] so the engine can be
/// built without an environment.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub max_concurrent_jobs: usize,
    pub progress_batch_size: usize,
    pub max_total_items: u64,
    pub store_write_retries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            progress_batch_size: 10,
            max_total_items: 50_000,
            store_write_retries: 3,
        }
    }
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_concurrent_jobs: config.max_concurrent_jobs,
            progress_batch_size: config.progress_batch_size,
            max_total_items: config.max_total_items,
            store_write_retries: config.store_write_retries,
        }
    }
}

/// Cancellation tokens for jobs currently running in this process.
struct CancellationTokens {
    inner: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl CancellationTokens {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Register a token for a job, unless one is already live. A live token
    /// means the job is already dispatched in this process; replacing it
    /// would leave its orchestrator watching a token nobody can cancel.
    async fn try_insert(&self, job_id: Uuid) -> Option<CancellationToken> {
        match self.inner.lock().await.entry(job_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                slot.insert(token.clone());
                Some(token)
            }
        }
    }

    async fn get(&self, job_id: Uuid) -> Option<CancellationToken> {
        self.inner.lock().await.get(&job_id).cloned()
    }

    async fn remove(&self, job_id: Uuid) {
        self.inner.lock().await.remove(&job_id);
    }
}

/// Orchestrates bulk matching jobs end to end.
///
/// Cloneable and cheap to share; all state lives behind `Arc`s.
#[derive(Clone)]
pub struct MatchEngine {
    store: Arc<dyn JobStore>,
    scorer: Arc<dyn Scorer>,
    notifier: Arc<dyn Notifier>,
    settings: EngineSettings,
    job_slots: Arc<Semaphore>,
    tokens: Arc<CancellationTokens>,
}

impl MatchEngine {
    pub fn new(
        store: Arc<dyn JobStore>,
        scorer: Arc<dyn Scorer>,
        notifier: Arc<dyn Notifier>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            scorer,
            notifier,
            job_slots: Arc::new(Semaphore::new(settings.max_concurrent_jobs)),
            tokens: Arc::new(CancellationTokens::new()),
            settings,
        }
    }

    /// Validate a submission, persist the job record and hand it to an
    /// orchestrator task. Returns the job id immediately; processing is
    /// asynchronous.
    pub async fn submit(&self, submission: JobSubmission) -> Result<Uuid, SubmitError> {
        submission.validate()?;

        let total_items = submission.total_items();
        if total_items > self.settings.max_total_items {
            return Err(SubmitError::TooLarge {
                total: total_items,
                cap: self.settings.max_total_items,
            });
        }

        let job = BulkMatchJob::new(submission, total_items, Utc::now());
        let job_id = job.id;
        self.store.create_job(&job).await?;
        counter!("bulk_match_jobs_total").increment(1);
        tracing::info!(
            %job_id,
            owner_id = %job.owner_id,
            match_type = %job.match_type,
            total_items,
            "bulk match job submitted"
        );

        self.dispatch(job).await;
        Ok(job_id)
    }

    /// Spawn an orchestrator for the job, supervised so a panic inside the
    /// task still leaves the job in a terminal state.
    ///
    /// Returns false when the job is already dispatched in this process. A
    /// job waiting on a slot is still `pending` in the store, so every poll
    /// tick would otherwise dispatch it again.
    async fn dispatch(&self, job: BulkMatchJob) -> bool {
        let job_id = job.id;
        let Some(cancel) = self.tokens.try_insert(job_id).await else {
            tracing::debug!(%job_id, "job already dispatched in this process, skipping");
            return false;
        };

        let orchestrator = Orchestrator {
            store: Arc::clone(&self.store),
            scorer: Arc::clone(&self.scorer),
            notifier: Arc::clone(&self.notifier),
            settings: self.settings,
            cancel,
        };
        let job_slots = Arc::clone(&self.job_slots);
        let handle = tokio::spawn(orchestrator.run(job_slots, job));

        let store = Arc::clone(&self.store);
        let tokens = Arc::clone(&self.tokens);
        tokio::spawn(async move {
            if let Err(err) = handle.await {
                tracing::error!(%job_id, error = %err, "orchestrator task aborted");
                counter!("bulk_match_jobs_failed_total").increment(1);
                let message = format!("orchestrator task aborted: {err}");
                if let Err(err) = store.fail_job(job_id, &message, Utc::now()).await {
                    tracing::warn!(%job_id, error = %err, "failed to record aborted job");
                }
            }
            tokens.remove(job_id).await;
        });
        true
    }

    /// Dispatch jobs left pending in the store, oldest first. Used at worker
    /// startup and on every poll tick. Jobs already dispatched in this
    /// process are skipped via the token registry; the claim step keeps
    /// concurrent dispatchers in other processes from double-processing.
    /// Returns the number of jobs newly dispatched.
    pub async fn dispatch_pending(&self, limit: usize) -> Result<usize, StoreError> {
        let jobs = self.store.pending_jobs(limit).await?;
        let mut count = 0;
        for job in jobs {
            if self.dispatch(job).await {
                count += 1;
            }
        }
        Ok(count)
    }

    pub async fn job_status(&self, job_id: Uuid) -> Result<Option<BulkMatchJob>, StoreError> {
        self.store.fetch_job(job_id).await
    }

    pub async fn job_results(
        &self,
        job_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<BulkMatchResult>, StoreError> {
        self.store.list_results(job_id, limit).await
    }

    /// Request cancellation of a job.
    ///
    /// The store flip happens first, so a token-observed cancellation always
    /// has the `cancelled` status already persisted. Returns false when the
    /// job was already terminal, which is not an error.
    pub async fn cancel(&self, job_id: Uuid) -> Result<bool, StoreError> {
        let flipped = self.store.cancel_job(job_id, Utc::now()).await?;
        if !flipped {
            tracing::debug!(%job_id, "cancellation ignored, job already terminal");
            return Ok(false);
        }

        if let Some(token) = self.tokens.get(job_id).await {
            token.cancel();
        }
        tracing::info!(%job_id, "bulk match job cancellation requested");
        Ok(true)
    }
}
