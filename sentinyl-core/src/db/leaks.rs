use sqlx::PgPool;
use tracing::info;

use crate::error::Result;
use sentinyl_model::{JobId, Leak, LeakId, Severity};

/// Insert payload for a code-search match.
#[derive(Debug, Clone)]
pub struct NewLeak {
    pub job_id: JobId,
    pub domain: String,
    pub repository_url: String,
    pub repository_name: String,
    pub file_path: String,
    pub snippet: Option<String>,
    pub leak_kind: String,
    pub severity: Severity,
    pub is_public: bool,
}

#[derive(Debug, Clone)]
pub struct LeaksRepo {
    pool: PgPool,
}

impl LeaksRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, new: NewLeak) -> Result<Leak> {
        let leak = sqlx::query_as::<_, Leak>(
            r#"
            INSERT INTO leaks (
                id, job_id, domain, repository_url, repository_name,
                file_path, snippet, leak_kind, severity, is_public, discovered_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            RETURNING id, job_id, domain, repository_url, repository_name,
                      file_path, snippet, leak_kind, severity, is_public,
                      notified, discovered_at
            "#,
        )
        .bind(LeakId::new())
        .bind(new.job_id)
        .bind(&new.domain)
        .bind(&new.repository_url)
        .bind(&new.repository_name)
        .bind(&new.file_path)
        .bind(&new.snippet)
        .bind(&new.leak_kind)
        .bind(new.severity.as_str())
        .bind(new.is_public)
        .fetch_one(&self.pool)
        .await?;

        info!("Saved leak: {}", leak.repository_url);
        Ok(leak)
    }

    pub async fn list_for_job(&self, job_id: JobId) -> Result<Vec<Leak>> {
        let leaks = sqlx::query_as::<_, Leak>(
            r#"
            SELECT id, job_id, domain, repository_url, repository_name,
                   file_path, snippet, leak_kind, severity, is_public,
                   notified, discovered_at
            FROM leaks
            WHERE job_id = $1
            ORDER BY discovered_at
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(leaks)
    }

    pub async fn count_all(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM leaks")
            .fetch_one(&self.pool)
            .await?)
    }
}
