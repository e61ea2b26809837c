use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregate;
use crate::engine::EngineSettings;
use crate::models::job::{progress_pct, BulkMatchJob, JobStatus, ResultsSummary};
use crate::models::result::BulkMatchResult;
use crate::notify::{CompletionNotice, Notifier};
use crate::scorer::Scorer;
use crate::store::{ClaimOutcome, JobStore, ProgressCounters, StoreError};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Drives one job from claim to a terminal state.
///
/// Runs on its own task; a panic here is caught by the supervising watcher in
/// the engine, which marks the job failed.
pub(crate) struct Orchestrator {
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) scorer: Arc<dyn Scorer>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) settings: EngineSettings,
    pub(crate) cancel: CancellationToken,
}

enum LoopOutcome {
    /// Every pair was processed.
    Exhausted,
    /// Cancellation was observed between pairs or at a flush boundary.
    Cancelled,
}

impl Orchestrator {
    pub(crate) async fn run(self, job_slots: Arc<Semaphore>, job: BulkMatchJob) {
        let _permit = match job_slots.acquire_owned().await {
            Ok(permit) => permit,
            // Semaphore is closed only during shutdown.
            Err(_) => return,
        };

        let claimed = match self
            .with_retry("claim job", || self.store.claim_job(job.id, Utc::now()))
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                self.mark_failed(job.id, &format!("failed to claim job: {err}"))
                    .await;
                return;
            }
        };

        let job = match claimed {
            ClaimOutcome::Claimed(job) => job,
            ClaimOutcome::Cancelled(job) => {
                self.finish_cancelled(job.id).await;
                return;
            }
            ClaimOutcome::Unavailable => {
                tracing::debug!(job_id = %job.id, "job already claimed or terminal, skipping");
                return;
            }
        };

        tracing::info!(
            job_id = %job.id,
            owner_id = %job.owner_id,
            match_type = %job.match_type,
            total_items = job.total_items,
            "processing bulk match job"
        );

        match self.process_pairs(&job).await {
            Ok((LoopOutcome::Exhausted, counters)) => self.finish_completed(&job, counters).await,
            Ok((LoopOutcome::Cancelled, _)) => self.finish_cancelled(job.id).await,
            Err(err) => {
                self.mark_failed(job.id, &format!("store write failed: {err}"))
                    .await
            }
        }
    }

    /// Score every (candidate, job posting) pair in order, flushing result
    /// rows and the counter snapshot to the store in batches.
    ///
    /// Pairs are enumerated candidate-major so result row order is stable. A
    /// scorer failure only fails that pair; the loop continues.
    async fn process_pairs(
        &self,
        job: &BulkMatchJob,
    ) -> Result<(LoopOutcome, ProgressCounters), StoreError> {
        let mut batch: Vec<BulkMatchResult> = Vec::with_capacity(self.settings.progress_batch_size);
        let mut processed = 0u64;
        let mut successful = 0u64;
        let mut failed = 0u64;
        let mut outcome = LoopOutcome::Exhausted;

        let counters = |processed, successful, failed| ProgressCounters {
            processed_items: processed,
            successful_matches: successful,
            failed_items: failed,
            progress: progress_pct(processed, job.total_items),
        };

        'pairs: for candidate_id in &job.source.candidate_ids {
            for job_posting_id in &job.source.job_ids {
                if self.cancel.is_cancelled() {
                    outcome = LoopOutcome::Cancelled;
                    break 'pairs;
                }

                match self.scorer.score(candidate_id, job_posting_id).await {
                    Ok(scores) => {
                        successful += 1;
                        batch.push(BulkMatchResult::completed(
                            job.id,
                            candidate_id,
                            job_posting_id,
                            scores,
                        ));
                    }
                    Err(err) => {
                        failed += 1;
                        counter!("bulk_match_pair_failures_total").increment(1);
                        tracing::warn!(
                            job_id = %job.id,
                            candidate_id,
                            job_posting_id,
                            error = %err,
                            "pair scoring failed"
                        );
                        batch.push(BulkMatchResult::failed(
                            job.id,
                            candidate_id,
                            job_posting_id,
                            err.to_string(),
                        ));
                    }
                }
                processed += 1;
                counter!("bulk_match_pairs_scored_total").increment(1);

                if batch.len() >= self.settings.progress_batch_size {
                    let snapshot = counters(processed, successful, failed);
                    let status = self.flush(job.id, &mut batch, snapshot).await?;
                    if status == JobStatus::Cancelled {
                        outcome = LoopOutcome::Cancelled;
                        break 'pairs;
                    }
                }
            }
        }

        // The final flush always runs, even with an empty batch, so the
        // authoritative counter snapshot (and progress 100 for an empty job)
        // lands in the store.
        let snapshot = counters(processed, successful, failed);
        let status = self.flush(job.id, &mut batch, snapshot).await?;
        if status == JobStatus::Cancelled {
            outcome = LoopOutcome::Cancelled;
        }

        Ok((outcome, snapshot))
    }

    async fn flush(
        &self,
        job_id: Uuid,
        batch: &mut Vec<BulkMatchResult>,
        counters: ProgressCounters,
    ) -> Result<JobStatus, StoreError> {
        let rows = std::mem::take(batch);
        self.with_retry("record result batch", || {
            self.store.record_batch(job_id, &rows, counters)
        })
        .await
    }

    async fn finish_completed(&self, job: &BulkMatchJob, counters: ProgressCounters) {
        let stats = match aggregate::summarize(self.store.as_ref(), job.id).await {
            Ok(stats) => stats,
            Err(err) => {
                self.mark_failed(job.id, &format!("failed to aggregate results: {err}"))
                    .await;
                return;
            }
        };

        let completed_at = Utc::now();
        let duration_seconds = job
            .started_at
            .map(|started| (completed_at - started).num_seconds().max(0) as u64)
            .unwrap_or(0);

        let summary = ResultsSummary {
            total_processed: counters.processed_items,
            successful_matches: counters.successful_matches,
            failed_items: counters.failed_items,
            duration_seconds,
            average_match_score: stats.average_match_score,
            high_quality_matches: stats.high_quality_matches,
        };

        let done = match self
            .with_retry("complete job", || {
                self.store.complete_job(job.id, &summary, completed_at)
            })
            .await
        {
            Ok(done) => done,
            Err(err) => {
                self.mark_failed(job.id, &format!("failed to complete job: {err}"))
                    .await;
                return;
            }
        };

        if !done {
            // A cancellation raced the final flush; honor it.
            self.finish_cancelled(job.id).await;
            return;
        }

        counter!("bulk_match_jobs_completed_total").increment(1);
        histogram!("bulk_match_job_duration_seconds").record(duration_seconds as f64);
        tracing::info!(
            job_id = %job.id,
            total_processed = summary.total_processed,
            successful_matches = summary.successful_matches,
            failed_items = summary.failed_items,
            duration_seconds,
            "bulk match job completed"
        );

        let notice = CompletionNotice {
            operation_type: "bulk_match".to_string(),
            total_processed: summary.total_processed,
            success_count: summary.successful_matches,
            failure_count: summary.failed_items,
            duration_seconds,
        };
        if let Err(err) = self
            .notifier
            .notify_completion(&job.owner_id, &notice)
            .await
        {
            tracing::warn!(job_id = %job.id, error = %err, "completion notification failed");
        }
    }

    /// Attach a partial-results summary to a job already marked cancelled.
    /// Cancellation is silent: no completion notification goes out.
    async fn finish_cancelled(&self, job_id: Uuid) {
        let job = match self.store.fetch_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(%job_id, "cancelled job vanished before summary");
                return;
            }
            Err(err) => {
                tracing::warn!(%job_id, error = %err, "failed to load cancelled job");
                return;
            }
        };

        let stats = match aggregate::summarize(self.store.as_ref(), job_id).await {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!(%job_id, error = %err, "failed to aggregate cancelled job");
                return;
            }
        };

        let duration_seconds = match (job.started_at, job.completed_at) {
            (Some(started), Some(ended)) => (ended - started).num_seconds().max(0) as u64,
            _ => 0,
        };

        let summary = ResultsSummary {
            total_processed: job.processed_items,
            successful_matches: job.successful_matches,
            failed_items: job.failed_items,
            duration_seconds,
            average_match_score: stats.average_match_score,
            high_quality_matches: stats.high_quality_matches,
        };

        if let Err(err) = self
            .with_retry("attach summary", || {
                self.store.attach_summary(job_id, &summary)
            })
            .await
        {
            tracing::warn!(%job_id, error = %err, "failed to attach summary to cancelled job");
        }

        counter!("bulk_match_jobs_cancelled_total").increment(1);
        tracing::info!(
            %job_id,
            total_processed = summary.total_processed,
            "bulk match job cancelled"
        );
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str) {
        tracing::error!(%job_id, error, "bulk match job failed");
        counter!("bulk_match_jobs_failed_total").increment(1);

        if let Err(err) = self
            .with_retry("fail job", || {
                self.store.fail_job(job_id, error, Utc::now())
            })
            .await
        {
            tracing::warn!(%job_id, error = %err, "failed to record job failure");
        }
    }

    /// Retry a store write with doubling backoff before giving up.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.settings.store_write_retries => {
                    attempt += 1;
                    tracing::warn!(what, attempt, error = %err, "store write failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
