use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::auth::TierLimits;
use crate::error::{Result, SentinylError};
use sentinyl_model::{ApiKey, KeyId, Subscription, SubscriptionId, Tier, User, UserId};

/// Outcome of a failed quota admission, used to build the 402 body.
#[derive(Debug, Clone)]
pub struct QuotaExceeded {
    pub quota_used: i32,
    pub quota_limit: i32,
    pub resets_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AccountsRepo {
    pool: PgPool,
}

impl AccountsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_user(&self, email: &str, name: Option<&str>) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name)
            VALUES ($1, $2, $3)
            RETURNING id, email, name, active, created_at
            "#,
        )
        .bind(UserId::new())
        .bind(email)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("users_email_key") {
                    return SentinylError::Conflict("email already registered".to_string());
                }
            }
            e.into()
        })?;

        info!("Created user {} ({})", user.email, user.id);
        Ok(user)
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, name, active, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    // -----------------------------------------------------------------------
    // API keys
    // -----------------------------------------------------------------------

    pub async fn insert_api_key(
        &self,
        user_id: UserId,
        key_prefix: &str,
        key_hash: &str,
        label: Option<&str>,
    ) -> Result<ApiKey> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (id, user_id, key_prefix, key_hash, label)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, key_prefix, key_hash, label, revoked,
                      last_used_at, created_at
            "#,
        )
        .bind(KeyId::new())
        .bind(user_id)
        .bind(key_prefix)
        .bind(key_hash)
        .bind(label)
        .fetch_one(&self.pool)
        .await?;

        Ok(key)
    }

    /// All live keys sharing the plain key's prefix. The caller verifies
    /// the hash; the prefix only narrows the scan.
    pub async fn find_keys_by_prefix(&self, key_prefix: &str) -> Result<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT id, user_id, key_prefix, key_hash, label, revoked,
                   last_used_at, created_at
            FROM api_keys
            WHERE key_prefix = $1 AND revoked = FALSE
            "#,
        )
        .bind(key_prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    pub async fn touch_api_key(&self, id: KeyId) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn revoke_api_key(&self, id: KeyId, user_id: UserId) -> Result<()> {
        let result =
            sqlx::query("UPDATE api_keys SET revoked = TRUE WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(SentinylError::NotFound(format!("api key {id} not found")));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Subscriptions and quotas
    // -----------------------------------------------------------------------

    pub async fn create_subscription(&self, user_id: UserId, tier: Tier) -> Result<Subscription> {
        let limits = TierLimits::for_tier(tier);
        let now = Utc::now();

        let sub = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (
                id, user_id, tier, status, scan_quota, agent_quota,
                scan_used, agent_used, cycle_start, cycle_end
            )
            VALUES ($1, $2, $3, 'active', $4, $5, 0, 0, $6, $7)
            RETURNING id, user_id, tier, status, scan_quota, agent_quota,
                      scan_used, agent_used, cycle_start, cycle_end
            "#,
        )
        .bind(SubscriptionId::new())
        .bind(user_id)
        .bind(tier.as_str())
        .bind(limits.scan_quota)
        .bind(limits.agent_quota)
        .bind(now)
        .bind(now + Duration::days(30))
        .fetch_one(&self.pool)
        .await?;

        info!("Created {} subscription for user {}", tier, user_id);
        Ok(sub)
    }

    /// Active subscription for the user, creating the free tier lazily and
    /// rolling the 30-day cycle forward when it has lapsed.
    pub async fn subscription_for(&self, user_id: UserId) -> Result<Subscription> {
        let existing = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, user_id, tier, status, scan_quota, agent_quota,
                   scan_used, agent_used, cycle_start, cycle_end
            FROM subscriptions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let sub = match existing {
            Some(sub) => sub,
            None => self.create_subscription(user_id, Tier::Free).await?,
        };

        if Utc::now() > sub.cycle_end {
            return self.reset_cycle(sub.id).await;
        }

        Ok(sub)
    }

    async fn reset_cycle(&self, id: SubscriptionId) -> Result<Subscription> {
        let now = Utc::now();
        let sub = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions
            SET scan_used = 0, agent_used = 0, cycle_start = $2, cycle_end = $3
            WHERE id = $1
            RETURNING id, user_id, tier, status, scan_quota, agent_quota,
                      scan_used, agent_used, cycle_start, cycle_end
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(now + Duration::days(30))
        .fetch_one(&self.pool)
        .await?;

        info!("Reset quota cycle for subscription {}", id);
        Ok(sub)
    }

    /// Atomic admission gate: one conditional update is the single source
    /// of truth for scan quota, so concurrent submissions cannot overdraw.
    pub async fn try_consume_scan(
        &self,
        user_id: UserId,
    ) -> Result<std::result::Result<(), QuotaExceeded>> {
        let sub = self.subscription_for(user_id).await?;

        if sub.scans_unlimited() {
            return Ok(Ok(()));
        }

        let row: Option<(i32, i32, DateTime<Utc>)> = sqlx::query_as(
            r#"
            UPDATE subscriptions
            SET scan_used = scan_used + 1
            WHERE user_id = $1 AND scan_used < scan_quota
            RETURNING scan_used, scan_quota, cycle_end
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((used, quota, _)) => {
                info!("Scan quota: {}/{} for user {}", used, quota, user_id);
                Ok(Ok(()))
            }
            None => Ok(Err(QuotaExceeded {
                quota_used: sub.scan_used,
                quota_limit: sub.scan_quota,
                resets_at: sub.cycle_end,
            })),
        }
    }
}
