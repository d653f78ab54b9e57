use sqlx::PgPool;
use tracing::info;

use crate::error::{Result, SentinylError};
use sentinyl_model::{DomainId, JobId, ScanJob, ScanKind};

#[derive(Debug, Clone)]
pub struct JobsRepo {
    pool: PgPool,
}

impl JobsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, domain_id: DomainId, kind: ScanKind) -> Result<ScanJob> {
        let job = sqlx::query_as::<_, ScanJob>(
            r#"
            INSERT INTO scan_jobs (id, domain_id, kind, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING id, domain_id, kind, status, started_at, completed_at,
                      error_message, created_at
            "#,
        )
        .bind(JobId::new())
        .bind(domain_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        info!("Created scan job {} ({})", job.id, kind);
        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Result<Option<ScanJob>> {
        let job = sqlx::query_as::<_, ScanJob>(
            r#"
            SELECT id, domain_id, kind, status, started_at, completed_at,
                   error_message, created_at
            FROM scan_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Job plus the name of the domain it targets.
    pub async fn get_with_domain(&self, id: JobId) -> Result<Option<(ScanJob, String)>> {
        let Some(job) = self.get(id).await? else {
            return Ok(None);
        };

        let name: String = sqlx::query_scalar("SELECT name FROM domains WHERE id = $1")
            .bind(job.domain_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Some((job, name)))
    }

    /// `pending -> processing`, stamping `started_at`. The status guard
    /// makes redelivered or replayed payloads a no-op instead of a rewind.
    pub async fn mark_processing(&self, id: JobId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'processing', started_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            info!("Job {} -> processing", id);
        }
        Ok(updated)
    }

    /// `processing -> completed`. Terminal rows are never updated again.
    pub async fn mark_completed(&self, id: JobId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'completed', completed_at = NOW(), error_message = NULL
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SentinylError::Conflict(format!(
                "job {id} is not in a completable state"
            )));
        }
        info!("Job {} -> completed", id);
        Ok(())
    }

    /// Any non-terminal state `-> failed` with the stringified cause.
    pub async fn mark_failed(&self, id: JobId, error: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'failed', completed_at = NOW(), error_message = $2
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SentinylError::Conflict(format!(
                "job {id} is already terminal"
            )));
        }
        info!("Job {} -> failed: {}", id, error);
        Ok(())
    }

    pub async fn count_all(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM scan_jobs")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn count_pending(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM scan_jobs WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?,
        )
    }
}
