use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Outcome of one scoring attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResultStatus {
    Completed,
    Failed,
}

/// Qualitative breakdown accompanying a match score.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchBreakdown {
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Multi-dimensional scores returned by the scorer for one pair.
/// All numeric scores are integers in 0–100.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairScores {
    pub match_score: u8,
    pub skill_match_score: u8,
    pub culture_fit_score: u8,
    pub wellbeing_match_score: u8,
    pub match_breakdown: MatchBreakdown,
    pub match_explanation: String,
}

/// One row per attempted (candidate, job posting) pair.
///
/// Rows are append-only: written once by the orchestrator, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkMatchResult {
    pub job_id: Uuid,
    pub candidate_id: String,
    pub job_posting_id: String,
    pub status: ResultStatus,
    pub scores: Option<PairScores>,
    pub error_message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl BulkMatchResult {
    pub fn completed(
        job_id: Uuid,
        candidate_id: &str,
        job_posting_id: &str,
        scores: PairScores,
    ) -> Self {
        Self {
            job_id,
            candidate_id: candidate_id.to_string(),
            job_posting_id: job_posting_id.to_string(),
            status: ResultStatus::Completed,
            scores: Some(scores),
            error_message: None,
            processed_at: Utc::now(),
        }
    }

    pub fn failed(
        job_id: Uuid,
        candidate_id: &str,
        job_posting_id: &str,
        error_message: String,
    ) -> Self {
        Self {
            job_id,
            candidate_id: candidate_id.to_string(),
            job_posting_id: job_posting_id.to_string(),
            status: ResultStatus::Failed,
            scores: None,
            error_message: Some(error_message),
            processed_at: Utc::now(),
        }
    }
}
