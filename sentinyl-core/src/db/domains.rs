use sqlx::PgPool;
use tracing::info;

use crate::error::Result;
use sentinyl_model::{Domain, DomainId, Priority, UserId};

#[derive(Debug, Clone)]
pub struct DomainsRepo {
    pool: PgPool,
}

impl DomainsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load the record for a (case-folded) domain name, creating it under
    /// the caller on first sight. A concurrent insert of the same name is
    /// resolved by the unique constraint and a follow-up read.
    pub async fn get_or_create(
        &self,
        name: &str,
        user_id: UserId,
        priority: Priority,
    ) -> Result<Domain> {
        if let Some(existing) = self.get_by_name(name).await? {
            return Ok(existing);
        }

        let inserted = sqlx::query_as::<_, Domain>(
            r#"
            INSERT INTO domains (id, name, user_id, priority)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, name, user_id, priority, active, created_at, updated_at
            "#,
        )
        .bind(DomainId::new())
        .bind(name)
        .bind(user_id)
        .bind(priority.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(domain) => {
                info!("Created domain record: {}", domain.name);
                Ok(domain)
            }
            // Lost the race; the row exists now.
            None => Ok(self
                .get_by_name(name)
                .await?
                .ok_or_else(|| crate::SentinylError::Internal(format!("domain vanished: {name}")))?),
        }
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Domain>> {
        let domain = sqlx::query_as::<_, Domain>(
            r#"
            SELECT id, name, user_id, priority, active, created_at, updated_at
            FROM domains
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(domain)
    }

    pub async fn count_active(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM domains WHERE active = TRUE")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
