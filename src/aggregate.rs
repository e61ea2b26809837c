//! Summary statistics over a job's result rows.

use uuid::Uuid;

use crate::models::result::ResultStatus;
use crate::store::{JobStore, StoreError};

/// Overall score at or above which a pair counts as a high-quality match.
pub const HIGH_QUALITY_THRESHOLD: u8 = 90;

/// Score statistics computed in a single scan at job termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreStats {
    /// Rounded mean of `match_score` over completed pairs; 0 when there are none.
    pub average_match_score: u8,
    pub high_quality_matches: u64,
}

/// Scan a job's result rows once and fold out the score statistics.
///
/// Called exactly once per job, at termination, so result accumulation stays
/// O(n) overall.
pub async fn summarize(store: &dyn JobStore, job_id: Uuid) -> Result<ScoreStats, StoreError> {
    let rows = store.list_results(job_id, None).await?;

    let mut completed = 0u64;
    let mut score_sum = 0u64;
    let mut high_quality = 0u64;

    for row in &rows {
        if row.status != ResultStatus::Completed {
            continue;
        }
        let Some(scores) = &row.scores else { continue };
        completed += 1;
        score_sum += scores.match_score as u64;
        if scores.match_score >= HIGH_QUALITY_THRESHOLD {
            high_quality += 1;
        }
    }

    let average_match_score = if completed == 0 {
        0
    } else {
        (score_sum as f64 / completed as f64).round() as u8
    };

    Ok(ScoreStats {
        average_match_score,
        high_quality_matches: high_quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{BulkMatchJob, MatchType, SourceSelection};
    use crate::models::result::{BulkMatchResult, MatchBreakdown, PairScores};
    use crate::models::submission::JobSubmission;
    use crate::store::memory::MemoryJobStore;
    use crate::store::ProgressCounters;
    use chrono::Utc;

    fn scores(overall: u8) -> PairScores {
        PairScores {
            match_score: overall,
            skill_match_score: overall,
            culture_fit_score: overall,
            wellbeing_match_score: overall,
            match_breakdown: MatchBreakdown::default(),
            match_explanation: String::new(),
        }
    }

    async fn store_with_rows(rows: Vec<BulkMatchResult>) -> (MemoryJobStore, uuid::Uuid) {
        let submission = JobSubmission {
            owner_id: "owner-1".to_string(),
            job_name: "aggregation test".to_string(),
            match_type: MatchType::AllToAll,
            source_type: "manual_selection".to_string(),
            source: SourceSelection::default(),
        };
        let job = BulkMatchJob::new(submission, rows.len() as u64, Utc::now());
        let job_id = job.id;

        let store = MemoryJobStore::new();
        store.create_job(&job).await.unwrap();
        let counters = ProgressCounters {
            processed_items: rows.len() as u64,
            successful_matches: rows.iter().filter(|r| r.scores.is_some()).count() as u64,
            failed_items: rows.iter().filter(|r| r.scores.is_none()).count() as u64,
            progress: 100,
        };
        store.record_batch(job_id, &rows, counters).await.unwrap();
        (store, job_id)
    }

    #[tokio::test]
    async fn averages_and_counts_high_quality() {
        let job_id = uuid::Uuid::new_v4();
        let rows = vec![
            BulkMatchResult::completed(job_id, "c1", "j1", scores(95)),
            BulkMatchResult::completed(job_id, "c2", "j1", scores(85)),
        ];
        let (store, job_id) = store_with_rows(rows).await;

        let stats = summarize(&store, job_id).await.unwrap();
        assert_eq!(stats.average_match_score, 90);
        assert_eq!(stats.high_quality_matches, 1);
    }

    #[tokio::test]
    async fn empty_result_set_averages_to_zero() {
        let (store, job_id) = store_with_rows(Vec::new()).await;
        let stats = summarize(&store, job_id).await.unwrap();
        assert_eq!(stats.average_match_score, 0);
        assert_eq!(stats.high_quality_matches, 0);
    }

    #[tokio::test]
    async fn failed_rows_are_excluded() {
        let job_id = uuid::Uuid::new_v4();
        let rows = vec![
            BulkMatchResult::completed(job_id, "c1", "j1", scores(90)),
            BulkMatchResult::failed(job_id, "c2", "j1", "scorer timeout".to_string()),
            BulkMatchResult::completed(job_id, "c3", "j1", scores(89)),
        ];
        let (store, job_id) = store_with_rows(rows).await;

        let stats = summarize(&store, job_id).await.unwrap();
        // Mean of 90 and 89; the threshold is inclusive at 90 only.
        assert_eq!(stats.average_match_score, 90);
        assert_eq!(stats.high_quality_matches, 1);
    }
}
