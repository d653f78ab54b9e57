use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{
    AnomalyKind, JobStatus, OperatorResponse, Priority, ScanKind, Severity, Tier,
};
use crate::ids::{
    AgentId, DomainId, EventId, JobId, KeyId, LeakId, SubscriptionId, ThreatId, UserId,
};

/// A domain under protection. Created on the first scan request for its
/// name and soft-deleted via `active = false`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Domain {
    pub id: DomainId,
    pub name: String,
    pub user_id: UserId,
    #[sqlx(try_from = "String")]
    pub priority: Priority,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One queued unit of detection work.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScanJob {
    pub id: JobId,
    pub domain_id: DomainId,
    #[sqlx(try_from = "String")]
    pub kind: ScanKind,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An active typosquat registration resolved against a monitored domain.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Threat {
    pub id: ThreatId,
    pub job_id: JobId,
    pub original_domain: String,
    pub malicious_domain: String,
    pub threat_kind: String,
    #[sqlx(try_from = "String")]
    pub severity: Severity,
    pub ip_address: Option<String>,
    pub nameservers: Vec<String>,
    pub whois_data: Option<String>,
    pub active: bool,
    pub verified: bool,
    pub notified: bool,
    pub discovered_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// A credential exposure found in a public code repository.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Leak {
    pub id: LeakId,
    pub job_id: JobId,
    pub domain: String,
    pub repository_url: String,
    pub repository_name: String,
    pub file_path: String,
    /// Decoded content around the match, capped at 500 bytes on ingest.
    pub snippet: Option<String>,
    pub leak_kind: String,
    #[sqlx(try_from = "String")]
    pub severity: Severity,
    pub is_public: bool,
    pub notified: bool,
    pub discovered_at: DateTime<Utc>,
}

/// A host running the guard agent. Created lazily on the first alert
/// carrying its agent id.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GuardAgent {
    pub id: AgentId,
    pub user_id: UserId,
    pub hostname: String,
    pub last_ip: Option<String>,
    pub os_info: Option<String>,
    pub last_heartbeat: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// One anomaly alert with its dead-man's-switch countdown.
///
/// `countdown_expires_at` is fixed at creation to
/// `countdown_started_at + 300s` and never mutated; expiry is materialized
/// lazily whenever the event is read.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GuardEvent {
    pub id: EventId,
    pub agent_id: AgentId,
    #[sqlx(try_from = "String")]
    pub anomaly_kind: AnomalyKind,
    #[sqlx(try_from = "String")]
    pub severity: Severity,
    pub target_ip: Option<String>,
    pub target_country: Option<String>,
    pub process_name: Option<String>,
    pub details: serde_json::Value,
    pub countdown_started_at: DateTime<Utc>,
    pub countdown_expires_at: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub operator_response: OperatorResponse,
    pub operator_user: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub blocked: bool,
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A stored API key. Only the argon2 hash is persisted; the plain key is
/// shown to the caller exactly once at mint time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiKey {
    pub id: KeyId,
    pub user_id: UserId,
    /// First characters of the plain key, used to narrow the hash lookup.
    pub key_prefix: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub label: Option<String>,
    pub revoked: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Per-user subscription with 30-day quota cycles. A quota of 0 means
/// unlimited.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    #[sqlx(try_from = "String")]
    pub tier: Tier,
    pub status: String,
    pub scan_quota: i32,
    pub agent_quota: i32,
    pub scan_used: i32,
    pub agent_used: i32,
    pub cycle_start: DateTime<Utc>,
    pub cycle_end: DateTime<Utc>,
}

impl Subscription {
    pub fn scans_unlimited(&self) -> bool {
        self.scan_quota == 0
    }

    pub fn agents_unlimited(&self) -> bool {
        self.agent_quota == 0
    }
}
