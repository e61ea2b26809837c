use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::models::result::PairScores;

#[derive(Debug, thiserror::Error)]
pub enum ScorerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse scorer response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("scorer returned out-of-range score: {0}")]
    OutOfRange(String),

    #[error("scoring failed: {0}")]
    Failed(String),
}

/// External scoring function for one (candidate, job posting) pair.
///
/// The orchestrator treats every failure identically: the pair is recorded as
/// failed and the job continues.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(
        &self,
        candidate_id: &str,
        job_posting_id: &str,
    ) -> Result<PairScores, ScorerError>;
}

/// Client for an HTTP scoring service.
///
/// Applies a bounded per-request timeout and never retries; a retry would
/// produce a second attempt against the same pair.
pub struct HttpScorer {
    http: Client,
    endpoint: String,
    api_token: String,
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    candidate_id: &'a str,
    job_posting_id: &'a str,
}

impl HttpScorer {
    pub fn new(endpoint: &str, api_token: &str, timeout: Duration) -> Result<Self, ScorerError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            api_token: api_token.to_string(),
        })
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn score(
        &self,
        candidate_id: &str,
        job_posting_id: &str,
    ) -> Result<PairScores, ScorerError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&ScoreRequest {
                candidate_id,
                job_posting_id,
            })
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        let scores: PairScores = serde_json::from_str(&body)?;
        validate_scores(&scores)?;
        Ok(scores)
    }
}

fn validate_scores(scores: &PairScores) -> Result<(), ScorerError> {
    let dimensions = [
        ("match_score", scores.match_score),
        ("skill_match_score", scores.skill_match_score),
        ("culture_fit_score", scores.culture_fit_score),
        ("wellbeing_match_score", scores.wellbeing_match_score),
    ];
    for (name, value) in dimensions {
        if value > 100 {
            return Err(ScorerError::OutOfRange(format!("{name} = {value}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::result::MatchBreakdown;

    fn scores(overall: u8) -> PairScores {
        PairScores {
            match_score: overall,
            skill_match_score: 70,
            culture_fit_score: 70,
            wellbeing_match_score: 70,
            match_breakdown: MatchBreakdown::default(),
            match_explanation: "solid overlap".to_string(),
        }
    }

    #[test]
    fn accepts_boundary_scores() {
        assert!(validate_scores(&scores(0)).is_ok());
        assert!(validate_scores(&scores(100)).is_ok());
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let err = validate_scores(&scores(101)).unwrap_err();
        assert!(err.to_string().contains("match_score"));
    }
}
