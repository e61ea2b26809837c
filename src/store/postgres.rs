use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{BulkMatchJob, JobStatus, MatchType, ResultsSummary, SourceSelection};
use crate::models::result::{BulkMatchResult, MatchBreakdown, PairScores, ResultStatus};
use crate::store::{ClaimOutcome, JobStore, ProgressCounters, StoreError};

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

const JOB_COLUMNS: &str = "id, owner_id, job_name, match_type, source_type, source_data, \
     total_items, processed_items, successful_matches, failed_items, progress, status, \
     created_at, started_at, completed_at, results_summary, error_message";

/// PostgreSQL-backed job store.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// A stored enum column holding something we cannot parse is corruption, not
/// a value to coerce: a defaulted status could report a terminal job as live.
fn parse_column<T: std::str::FromStr>(column: &'static str, value: &str) -> Result<T, StoreError> {
    value.parse().map_err(|_| StoreError::BadColumn {
        column,
        value: value.to_string(),
    })
}

fn job_from_row(row: &PgRow) -> Result<BulkMatchJob, StoreError> {
    let status: String = row.try_get("status")?;
    let match_type: String = row.try_get("match_type")?;
    let source: Json<SourceSelection> = row.try_get("source_data")?;
    let summary: Option<Json<ResultsSummary>> = row.try_get("results_summary")?;

    Ok(BulkMatchJob {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        job_name: row.try_get("job_name")?,
        match_type: parse_column("match_type", &match_type)?,
        source_type: row.try_get("source_type")?,
        source: source.0,
        total_items: row.try_get::<i64, _>("total_items")? as u64,
        processed_items: row.try_get::<i64, _>("processed_items")? as u64,
        successful_matches: row.try_get::<i64, _>("successful_matches")? as u64,
        failed_items: row.try_get::<i64, _>("failed_items")? as u64,
        progress: row.try_get::<i16, _>("progress")? as u8,
        status: parse_column("status", &status)?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        results_summary: summary.map(|s| s.0),
        error_message: row.try_get("error_message")?,
    })
}

fn result_from_row(row: &PgRow) -> Result<BulkMatchResult, StoreError> {
    let status: String = row.try_get("status")?;
    let match_score: Option<i16> = row.try_get("match_score")?;

    let scores = match match_score {
        Some(overall) => {
            let breakdown: Option<Json<MatchBreakdown>> = row.try_get("match_breakdown")?;
            Some(PairScores {
                match_score: overall as u8,
                skill_match_score: row
                    .try_get::<Option<i16>, _>("skill_match_score")?
                    .unwrap_or(0) as u8,
                culture_fit_score: row
                    .try_get::<Option<i16>, _>("culture_fit_score")?
                    .unwrap_or(0) as u8,
                wellbeing_match_score: row
                    .try_get::<Option<i16>, _>("wellbeing_match_score")?
                    .unwrap_or(0) as u8,
                match_breakdown: breakdown.map(|b| b.0).unwrap_or_default(),
                match_explanation: row
                    .try_get::<Option<String>, _>("match_explanation")?
                    .unwrap_or_default(),
            })
        }
        None => None,
    };

    Ok(BulkMatchResult {
        job_id: row.try_get("job_id")?,
        candidate_id: row.try_get("candidate_id")?,
        job_posting_id: row.try_get("job_posting_id")?,
        status: parse_column("status", &status)?,
        scores,
        error_message: row.try_get("error_message")?,
        processed_at: row.try_get("processed_at")?,
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, job: &BulkMatchJob) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bulk_match_jobs
                (id, owner_id, job_name, match_type, source_type, source_data,
                 total_items, processed_items, successful_matches, failed_items,
                 progress, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(job.id)
        .bind(&job.owner_id)
        .bind(&job.job_name)
        .bind(job.match_type.to_string())
        .bind(&job.source_type)
        .bind(Json(&job.source))
        .bind(job.total_items as i64)
        .bind(job.processed_items as i64)
        .bind(job.successful_matches as i64)
        .bind(job.failed_items as i64)
        .bind(job.progress as i16)
        .bind(job.status.to_string())
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_job(&self, id: Uuid) -> Result<Option<BulkMatchJob>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM bulk_match_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn claim_job(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE bulk_match_jobs
            SET status = 'processing', started_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(started_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(ClaimOutcome::Claimed(job_from_row(&row)?));
        }

        match self.fetch_job(id).await? {
            Some(job) if job.status == JobStatus::Cancelled => Ok(ClaimOutcome::Cancelled(job)),
            Some(_) => Ok(ClaimOutcome::Unavailable),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn record_batch(
        &self,
        id: Uuid,
        results: &[BulkMatchResult],
        counters: ProgressCounters,
    ) -> Result<JobStatus, StoreError> {
        let mut tx = self.pool.begin().await?;

        for result in results {
            sqlx::query(
                r#"
                INSERT INTO bulk_match_results
                    (job_id, candidate_id, job_posting_id, status,
                     match_score, skill_match_score, culture_fit_score, wellbeing_match_score,
                     match_breakdown, match_explanation, error_message, processed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(result.job_id)
            .bind(&result.candidate_id)
            .bind(&result.job_posting_id)
            .bind(result.status.to_string())
            .bind(result.scores.as_ref().map(|s| s.match_score as i16))
            .bind(result.scores.as_ref().map(|s| s.skill_match_score as i16))
            .bind(result.scores.as_ref().map(|s| s.culture_fit_score as i16))
            .bind(result.scores.as_ref().map(|s| s.wellbeing_match_score as i16))
            .bind(result.scores.as_ref().map(|s| Json(&s.match_breakdown)))
            .bind(result.scores.as_ref().map(|s| s.match_explanation.as_str()))
            .bind(result.error_message.as_deref())
            .bind(result.processed_at)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query(
            r#"
            UPDATE bulk_match_jobs
            SET processed_items = $2,
                successful_matches = $3,
                failed_items = $4,
                progress = $5
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(id)
        .bind(counters.processed_items as i64)
        .bind(counters.successful_matches as i64)
        .bind(counters.failed_items as i64)
        .bind(counters.progress as i16)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound(id))?;

        let status: String = row.try_get("status")?;
        let status = parse_column("status", &status)?;
        tx.commit().await?;

        Ok(status)
    }

    async fn complete_job(
        &self,
        id: Uuid,
        summary: &ResultsSummary,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE bulk_match_jobs
            SET status = 'completed', results_summary = $2, completed_at = $3
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(Json(summary))
        .bind(completed_at)
        .execute(&self.pool)
        .await?;

        Ok(done.rows_affected() > 0)
    }

    async fn fail_job(
        &self,
        id: Uuid,
        error_message: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE bulk_match_jobs
            SET status = 'failed', error_message = $2, completed_at = $3
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(id)
        .bind(error_message)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel_job(&self, id: Uuid, completed_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE bulk_match_jobs
            SET status = 'cancelled', completed_at = $2
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(id)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;

        Ok(done.rows_affected() > 0)
    }

    async fn attach_summary(&self, id: Uuid, summary: &ResultsSummary) -> Result<(), StoreError> {
        sqlx::query("UPDATE bulk_match_jobs SET results_summary = $2 WHERE id = $1")
            .bind(id)
            .bind(Json(summary))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_results(
        &self,
        job_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<BulkMatchResult>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, candidate_id, job_posting_id, status,
                   match_score, skill_match_score, culture_fit_score, wellbeing_match_score,
                   match_breakdown, match_explanation, error_message, processed_at
            FROM bulk_match_results
            WHERE job_id = $1
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(job_id)
        .bind(limit.map(|n| n as i64))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(result_from_row).collect()
    }

    async fn pending_jobs(&self, limit: usize) -> Result<Vec<BulkMatchJob>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM bulk_match_jobs
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_enum_columns() {
        let status: JobStatus = parse_column("status", "processing").unwrap();
        assert_eq!(status, JobStatus::Processing);

        let match_type: MatchType = parse_column("match_type", "all_to_all").unwrap();
        assert_eq!(match_type, MatchType::AllToAll);

        let result: ResultStatus = parse_column("status", "failed").unwrap();
        assert_eq!(result, ResultStatus::Failed);
    }

    #[test]
    fn rejects_corrupted_enum_columns() {
        let err = parse_column::<JobStatus>("status", "paused").unwrap_err();
        assert!(matches!(
            err,
            StoreError::BadColumn { column: "status", .. }
        ));
        assert!(err.to_string().contains("paused"));
    }
}
