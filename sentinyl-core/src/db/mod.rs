//! PostgreSQL store adapter.
//!
//! One [`Database`] wraps the connection pool and hands out per-entity
//! repositories. Schema bootstrap is idempotent (`CREATE TABLE IF NOT
//! EXISTS`) and runs at startup of the ingress and every worker.

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::error::Result;

mod accounts;
mod domains;
mod guard;
mod jobs;
mod leaks;
mod threats;

pub use accounts::{AccountsRepo, QuotaExceeded};
pub use domains::DomainsRepo;
pub use guard::{GuardRepo, NewGuardEvent};
pub use jobs::JobsRepo;
pub use leaks::{LeaksRepo, NewLeak};
pub use threats::{NewThreat, ThreatsRepo};

#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        info!("Successfully connected to PostgreSQL");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn domains(&self) -> DomainsRepo {
        DomainsRepo::new(self.pool.clone())
    }

    pub fn jobs(&self) -> JobsRepo {
        JobsRepo::new(self.pool.clone())
    }

    pub fn threats(&self) -> ThreatsRepo {
        ThreatsRepo::new(self.pool.clone())
    }

    pub fn leaks(&self) -> LeaksRepo {
        LeaksRepo::new(self.pool.clone())
    }

    pub fn guard(&self) -> GuardRepo {
        GuardRepo::new(self.pool.clone())
    }

    pub fn accounts(&self) -> AccountsRepo {
        AccountsRepo::new(self.pool.clone())
    }

    /// Connectivity probe for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn initialize_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema initialized");
        Ok(())
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        name TEXT,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS api_keys (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        key_prefix TEXT NOT NULL,
        key_hash TEXT NOT NULL,
        label TEXT,
        revoked BOOLEAN NOT NULL DEFAULT FALSE,
        last_used_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_api_keys_prefix ON api_keys (key_prefix)",
    r#"
    CREATE TABLE IF NOT EXISTS subscriptions (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL UNIQUE REFERENCES users(id),
        tier TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        scan_quota INTEGER NOT NULL,
        agent_quota INTEGER NOT NULL,
        scan_used INTEGER NOT NULL DEFAULT 0 CHECK (scan_used >= 0),
        agent_used INTEGER NOT NULL DEFAULT 0 CHECK (agent_used >= 0),
        cycle_start TIMESTAMPTZ NOT NULL,
        cycle_end TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS domains (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        user_id UUID NOT NULL REFERENCES users(id),
        priority TEXT NOT NULL DEFAULT 'medium',
        active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scan_jobs (
        id UUID PRIMARY KEY,
        domain_id UUID NOT NULL REFERENCES domains(id),
        kind TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        started_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ,
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_scan_jobs_status ON scan_jobs (status)",
    r#"
    CREATE TABLE IF NOT EXISTS threats (
        id UUID PRIMARY KEY,
        job_id UUID NOT NULL REFERENCES scan_jobs(id),
        original_domain TEXT NOT NULL,
        malicious_domain TEXT NOT NULL,
        threat_kind TEXT NOT NULL DEFAULT 'typosquat',
        severity TEXT NOT NULL DEFAULT 'medium',
        ip_address TEXT,
        nameservers TEXT[] NOT NULL DEFAULT '{}',
        whois_data TEXT,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        verified BOOLEAN NOT NULL DEFAULT FALSE,
        notified BOOLEAN NOT NULL DEFAULT FALSE,
        discovered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        verified_at TIMESTAMPTZ,
        resolved_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_threats_malicious_domain ON threats (malicious_domain)",
    "CREATE INDEX IF NOT EXISTS idx_threats_job ON threats (job_id)",
    r#"
    CREATE TABLE IF NOT EXISTS leaks (
        id UUID PRIMARY KEY,
        job_id UUID NOT NULL REFERENCES scan_jobs(id),
        domain TEXT NOT NULL,
        repository_url TEXT NOT NULL,
        repository_name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        snippet TEXT,
        leak_kind TEXT NOT NULL DEFAULT 'unknown',
        severity TEXT NOT NULL DEFAULT 'high',
        is_public BOOLEAN NOT NULL DEFAULT TRUE,
        notified BOOLEAN NOT NULL DEFAULT FALSE,
        discovered_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_leaks_job ON leaks (job_id)",
    r#"
    CREATE TABLE IF NOT EXISTS guard_agents (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        hostname TEXT NOT NULL,
        last_ip TEXT,
        os_info TEXT,
        last_heartbeat TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS guard_events (
        id UUID PRIMARY KEY,
        agent_id UUID NOT NULL REFERENCES guard_agents(id),
        anomaly_kind TEXT NOT NULL,
        severity TEXT NOT NULL,
        target_ip TEXT,
        target_country TEXT,
        process_name TEXT,
        details JSONB NOT NULL DEFAULT '{}'::jsonb,
        countdown_started_at TIMESTAMPTZ NOT NULL,
        countdown_expires_at TIMESTAMPTZ NOT NULL,
        operator_response TEXT NOT NULL DEFAULT 'none',
        operator_user TEXT,
        responded_at TIMESTAMPTZ,
        blocked BOOLEAN NOT NULL DEFAULT FALSE,
        acknowledged BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_guard_events_agent ON guard_events (agent_id)",
];
