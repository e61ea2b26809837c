use garde::Validate;
use serde::Deserialize;

use crate::models::job::{MatchType, SourceSelection};

/// Request to create a bulk match job.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct JobSubmission {
    #[garde(length(min = 1, max = 200))]
    pub owner_id: String,

    #[garde(length(min = 1, max = 200))]
    pub job_name: String,

    #[garde(skip)]
    pub match_type: MatchType,

    #[garde(length(min = 1, max = 100))]
    pub source_type: String,

    #[garde(skip)]
    pub source: SourceSelection,
}

impl JobSubmission {
    /// Number of pairs the selection expands into. Computed once at creation
    /// and fixed for the life of the job.
    ///
    /// Directed match types count the selected axis even when the target axis
    /// is empty, so a degenerate selection still produces a sized job.
    pub fn total_items(&self) -> u64 {
        let candidates = self.source.candidate_ids.len() as u64;
        let jobs = self.source.job_ids.len() as u64;
        match self.match_type {
            MatchType::AllToAll => candidates * jobs,
            MatchType::CandidatesToJob => candidates * jobs.max(1),
            MatchType::JobsToCandidate => jobs * candidates.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(match_type: MatchType, candidates: usize, jobs: usize) -> JobSubmission {
        JobSubmission {
            owner_id: "owner-1".to_string(),
            job_name: "weekly match run".to_string(),
            match_type,
            source_type: "manual_selection".to_string(),
            source: SourceSelection {
                candidate_ids: (0..candidates).map(|i| format!("c{i}")).collect(),
                job_ids: (0..jobs).map(|i| format!("j{i}")).collect(),
                filters: None,
            },
        }
    }

    #[test]
    fn all_to_all_is_full_cross_product() {
        assert_eq!(submission(MatchType::AllToAll, 3, 4).total_items(), 12);
        assert_eq!(submission(MatchType::AllToAll, 0, 4).total_items(), 0);
    }

    #[test]
    fn directed_types_floor_the_target_axis_at_one() {
        assert_eq!(submission(MatchType::CandidatesToJob, 5, 1).total_items(), 5);
        assert_eq!(submission(MatchType::CandidatesToJob, 5, 0).total_items(), 5);
        assert_eq!(submission(MatchType::JobsToCandidate, 0, 7).total_items(), 7);
        assert_eq!(submission(MatchType::JobsToCandidate, 2, 7).total_items(), 14);
    }

    #[test]
    fn validation_rejects_blank_owner() {
        let mut sub = submission(MatchType::AllToAll, 1, 1);
        sub.owner_id = String::new();
        assert!(sub.validate().is_err());
    }
}
