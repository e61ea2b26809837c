use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::job::{BulkMatchJob, JobStatus, ResultsSummary};
use crate::models::result::BulkMatchResult;
use crate::store::{ClaimOutcome, JobStore, ProgressCounters, StoreError};

/// In-memory job store for tests and local runs.
///
/// A single lock guards jobs and result rows, so counters and rows stay
/// consistent under the same atomicity contract as the SQL store.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<State>,
}

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, BulkMatchJob>,
    results: HashMap<Uuid, Vec<BulkMatchResult>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &BulkMatchJob) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        state.jobs.insert(job.id, job.clone());
        state.results.insert(job.id, Vec::new());
        Ok(())
    }

    async fn fetch_job(&self, id: Uuid) -> Result<Option<BulkMatchJob>, StoreError> {
        let state = self.inner.lock().await;
        Ok(state.jobs.get(&id).cloned())
    }

    async fn claim_job(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut state = self.inner.lock().await;
        let job = state.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        match job.status {
            JobStatus::Pending => {
                job.status = JobStatus::Processing;
                job.started_at = Some(started_at);
                Ok(ClaimOutcome::Claimed(job.clone()))
            }
            JobStatus::Cancelled => Ok(ClaimOutcome::Cancelled(job.clone())),
            _ => Ok(ClaimOutcome::Unavailable),
        }
    }

    async fn record_batch(
        &self,
        id: Uuid,
        results: &[BulkMatchResult],
        counters: ProgressCounters,
    ) -> Result<JobStatus, StoreError> {
        let mut state = self.inner.lock().await;
        if !state.jobs.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        state
            .results
            .entry(id)
            .or_default()
            .extend(results.iter().cloned());
        let job = state.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.processed_items = counters.processed_items;
        job.successful_matches = counters.successful_matches;
        job.failed_items = counters.failed_items;
        job.progress = counters.progress;
        Ok(job.status)
    }

    async fn complete_job(
        &self,
        id: Uuid,
        summary: &ResultsSummary,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.inner.lock().await;
        let job = state.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if job.status != JobStatus::Processing {
            return Ok(false);
        }
        job.status = JobStatus::Completed;
        job.results_summary = Some(summary.clone());
        job.completed_at = Some(completed_at);
        Ok(true)
    }

    async fn fail_job(
        &self,
        id: Uuid,
        error_message: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        let job = state.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !job.status.is_terminal() {
            job.status = JobStatus::Failed;
            job.error_message = Some(error_message.to_string());
            job.completed_at = Some(completed_at);
        }
        Ok(())
    }

    async fn cancel_job(&self, id: Uuid, completed_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.inner.lock().await;
        let job = state.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if job.status.is_terminal() {
            return Ok(false);
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(completed_at);
        Ok(true)
    }

    async fn attach_summary(&self, id: Uuid, summary: &ResultsSummary) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        let job = state.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.results_summary = Some(summary.clone());
        Ok(())
    }

    async fn list_results(
        &self,
        job_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<BulkMatchResult>, StoreError> {
        let state = self.inner.lock().await;
        let rows = state.results.get(&job_id).cloned().unwrap_or_default();
        Ok(match limit {
            Some(n) => rows.into_iter().take(n).collect(),
            None => rows,
        })
    }

    async fn pending_jobs(&self, limit: usize) -> Result<Vec<BulkMatchJob>, StoreError> {
        let state = self.inner.lock().await;
        let mut pending: Vec<BulkMatchJob> = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|j| j.created_at);
        pending.truncate(limit);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{MatchType, SourceSelection};
    use crate::models::submission::JobSubmission;

    fn job(total: u64) -> BulkMatchJob {
        let submission = JobSubmission {
            owner_id: "owner-1".to_string(),
            job_name: "test".to_string(),
            match_type: MatchType::AllToAll,
            source_type: "manual_selection".to_string(),
            source: SourceSelection::default(),
        };
        BulkMatchJob::new(submission, total, Utc::now())
    }

    #[tokio::test]
    async fn claim_is_exclusive() {
        let store = MemoryJobStore::new();
        let job = job(4);
        store.create_job(&job).await.unwrap();

        let first = store.claim_job(job.id, Utc::now()).await.unwrap();
        assert!(matches!(first, ClaimOutcome::Claimed(_)));

        let second = store.claim_job(job.id, Utc::now()).await.unwrap();
        assert!(matches!(second, ClaimOutcome::Unavailable));
    }

    #[tokio::test]
    async fn claim_reports_pre_start_cancellation() {
        let store = MemoryJobStore::new();
        let job = job(4);
        store.create_job(&job).await.unwrap();

        assert!(store.cancel_job(job.id, Utc::now()).await.unwrap());
        let outcome = store.claim_job(job.id, Utc::now()).await.unwrap();
        assert!(matches!(outcome, ClaimOutcome::Cancelled(_)));
    }

    #[tokio::test]
    async fn cancel_is_ignored_on_terminal_jobs() {
        let store = MemoryJobStore::new();
        let job = job(0);
        store.create_job(&job).await.unwrap();
        store.claim_job(job.id, Utc::now()).await.unwrap();

        let summary = ResultsSummary {
            total_processed: 0,
            successful_matches: 0,
            failed_items: 0,
            duration_seconds: 0,
            average_match_score: 0,
            high_quality_matches: 0,
        };
        assert!(store.complete_job(job.id, &summary, Utc::now()).await.unwrap());
        assert!(!store.cancel_job(job.id, Utc::now()).await.unwrap());

        let stored = store.fetch_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn complete_refuses_cancelled_jobs() {
        let store = MemoryJobStore::new();
        let job = job(2);
        store.create_job(&job).await.unwrap();
        store.claim_job(job.id, Utc::now()).await.unwrap();
        store.cancel_job(job.id, Utc::now()).await.unwrap();

        let summary = ResultsSummary {
            total_processed: 2,
            successful_matches: 2,
            failed_items: 0,
            duration_seconds: 1,
            average_match_score: 50,
            high_quality_matches: 0,
        };
        assert!(!store.complete_job(job.id, &summary, Utc::now()).await.unwrap());
    }
}
