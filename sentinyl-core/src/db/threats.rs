use sqlx::PgPool;
use tracing::info;

use crate::error::Result;
use sentinyl_model::{JobId, Severity, Threat, ThreatId};

/// Insert payload for a freshly resolved typosquat.
#[derive(Debug, Clone)]
pub struct NewThreat {
    pub job_id: JobId,
    pub original_domain: String,
    pub malicious_domain: String,
    pub severity: Severity,
    pub ip_address: Option<String>,
    pub nameservers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ThreatsRepo {
    pool: PgPool,
}

impl ThreatsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, new: NewThreat) -> Result<Threat> {
        let threat = sqlx::query_as::<_, Threat>(
            r#"
            INSERT INTO threats (
                id, job_id, original_domain, malicious_domain,
                threat_kind, severity, ip_address, nameservers, discovered_at
            )
            VALUES ($1, $2, $3, $4, 'typosquat', $5, $6, $7, NOW())
            RETURNING id, job_id, original_domain, malicious_domain, threat_kind,
                      severity, ip_address, nameservers, whois_data, active,
                      verified, notified, discovered_at, verified_at, resolved_at
            "#,
        )
        .bind(ThreatId::new())
        .bind(new.job_id)
        .bind(&new.original_domain)
        .bind(&new.malicious_domain)
        .bind(new.severity.as_str())
        .bind(&new.ip_address)
        .bind(&new.nameservers)
        .fetch_one(&self.pool)
        .await?;

        info!("Saved threat: {}", threat.malicious_domain);
        Ok(threat)
    }

    pub async fn list_for_job(&self, job_id: JobId) -> Result<Vec<Threat>> {
        let threats = sqlx::query_as::<_, Threat>(
            r#"
            SELECT id, job_id, original_domain, malicious_domain, threat_kind,
                   severity, ip_address, nameservers, whois_data, active,
                   verified, notified, discovered_at, verified_at, resolved_at
            FROM threats
            WHERE job_id = $1
            ORDER BY discovered_at
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(threats)
    }

    pub async fn mark_notified(&self, id: ThreatId) -> Result<()> {
        sqlx::query("UPDATE threats SET notified = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_active(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM threats WHERE active = TRUE")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    pub async fn count_unnotified(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM threats WHERE notified = FALSE")
                .fetch_one(&self.pool)
                .await?,
        )
    }
}
