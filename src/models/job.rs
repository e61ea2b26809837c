use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::submission::JobSubmission;

/// Status of a bulk match job in its lifecycle.
///
/// `Pending` and `Processing` are the only non-terminal states; once a job is
/// terminal it never transitions again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// How the selected candidate and job posting identifiers expand into pairs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchType {
    CandidatesToJob,
    JobsToCandidate,
    AllToAll,
}

/// Candidate and job posting identifiers selected at submission.
/// Immutable after the job record is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSelection {
    pub candidate_ids: Vec<String>,
    pub job_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<String>,
}

/// Aggregate statistics, populated only when a job reaches `completed` or
/// `cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultsSummary {
    pub total_processed: u64,
    pub successful_matches: u64,
    pub failed_items: u64,
    pub duration_seconds: u64,
    pub average_match_score: u8,
    pub high_quality_matches: u64,
}

/// A bulk match job record.
///
/// After creation the orchestrator is the sole writer of the counters,
/// `progress`, `status`, `results_summary` and `error_message` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkMatchJob {
    pub id: Uuid,
    pub owner_id: String,
    pub job_name: String,
    pub match_type: MatchType,
    pub source_type: String,
    pub source: SourceSelection,
    pub total_items: u64,
    pub processed_items: u64,
    pub successful_matches: u64,
    pub failed_items: u64,
    pub progress: u8,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results_summary: Option<ResultsSummary>,
    pub error_message: Option<String>,
}

impl BulkMatchJob {
    /// A freshly submitted job: `pending`, all counters at zero.
    pub fn new(submission: JobSubmission, total_items: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: submission.owner_id,
            job_name: submission.job_name,
            match_type: submission.match_type,
            source_type: submission.source_type,
            source: submission.source,
            total_items,
            processed_items: 0,
            successful_matches: 0,
            failed_items: 0,
            progress: if total_items == 0 { 100 } else { 0 },
            status: JobStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            results_summary: None,
            error_message: None,
        }
    }
}

/// Percentage completion recomputed from the authoritative counters.
///
/// Integer rounding, clamped so that 100 is reported only once every pair has
/// been processed. An empty job is complete by definition.
pub fn progress_pct(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = ((processed as f64 / total as f64) * 100.0).round() as u8;
    if processed < total {
        pct.min(99)
    } else {
        pct.min(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_rounds_to_nearest() {
        assert_eq!(progress_pct(1, 3), 33);
        assert_eq!(progress_pct(2, 3), 67);
        assert_eq!(progress_pct(1, 2), 50);
    }

    #[test]
    fn progress_is_100_only_when_exhausted() {
        // 999/1000 rounds to 100 but must not report completion early.
        assert_eq!(progress_pct(999, 1000), 99);
        assert_eq!(progress_pct(1000, 1000), 100);
    }

    #[test]
    fn empty_job_is_complete() {
        assert_eq!(progress_pct(0, 0), 100);
    }

    #[test]
    fn status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_round_trips_through_strings() {
        assert_eq!(JobStatus::Processing.to_string(), "processing");
        assert_eq!(
            "cancelled".parse::<JobStatus>().unwrap(),
            JobStatus::Cancelled
        );
        assert_eq!(
            "candidates_to_job".parse::<MatchType>().unwrap(),
            MatchType::CandidatesToJob
        );
    }
}
