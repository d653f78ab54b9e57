use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{Leak, Threat};
use crate::enums::{AnomalyKind, JobStatus, OperatorResponse, Priority, ScanKind, Severity, Tier};
use crate::ids::{AgentId, EventId, JobId, KeyId, LeakId, ThreatId, UserId};

/// Snippets are stored at up to 500 bytes but truncated further at the
/// read-back boundary.
pub const RESULT_SNIPPET_LIMIT: usize = 200;

/// Fixed dead-man's-switch countdown, seconds.
pub const COUNTDOWN_SECONDS: i64 = 300;

// ---------------------------------------------------------------------------
// Scan pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub domain: String,
    pub scan_type: ScanKind,
    #[serde(default)]
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub job_id: JobId,
    pub domain: String,
    pub scan_type: ScanKind,
    pub status: JobStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatResult {
    pub id: ThreatId,
    pub malicious_domain: String,
    pub threat_type: String,
    pub severity: Severity,
    pub ip_address: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl From<Threat> for ThreatResult {
    fn from(t: Threat) -> Self {
        Self {
            id: t.id,
            malicious_domain: t.malicious_domain,
            threat_type: t.threat_kind,
            severity: t.severity,
            ip_address: t.ip_address,
            discovered_at: t.discovered_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakResult {
    pub id: LeakId,
    pub repository_url: String,
    pub repository_name: String,
    pub file_path: String,
    pub snippet: Option<String>,
    pub leak_type: String,
    pub severity: Severity,
    pub discovered_at: DateTime<Utc>,
}

impl From<Leak> for LeakResult {
    fn from(l: Leak) -> Self {
        Self {
            id: l.id,
            repository_url: l.repository_url,
            repository_name: l.repository_name,
            file_path: l.file_path,
            snippet: l.snippet.as_deref().map(truncate_snippet),
            leak_type: l.leak_kind,
            severity: l.severity,
            discovered_at: l.discovered_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub domain: String,
    pub job_type: ScanKind,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub threats: Vec<ThreatResult>,
    #[serde(default)]
    pub leaks: Vec<LeakResult>,
    pub error_message: Option<String>,
}

/// Truncate a stored snippet to [`RESULT_SNIPPET_LIMIT`] bytes without
/// splitting a UTF-8 sequence.
pub fn truncate_snippet(snippet: &str) -> String {
    truncate_utf8(snippet, RESULT_SNIPPET_LIMIT)
}

/// Largest prefix of `s` that fits in `limit` bytes on a char boundary.
pub fn truncate_utf8(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }
    let mut end = limit;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

// ---------------------------------------------------------------------------
// Guard pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardAlertRequest {
    pub agent_id: AgentId,
    pub hostname: String,
    pub anomaly_type: AnomalyKind,
    pub severity: Severity,
    pub target_ip: Option<String>,
    pub target_country: Option<String>,
    pub process_name: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardAlertResponse {
    pub event_id: EventId,
    pub status: JobStatus,
    pub countdown_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardVerdictRequest {
    pub event_id: EventId,
    pub response: OperatorResponse,
    pub admin_user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardVerdictResponse {
    pub status: String,
}

/// One event in an agent status poll. `should_block` folds the operator
/// verdict and the lazy countdown expiry into a single actionable flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardEventStatus {
    pub event_id: EventId,
    pub anomaly_type: AnomalyKind,
    pub severity: Severity,
    pub target_ip: Option<String>,
    pub target_country: Option<String>,
    pub process_name: Option<String>,
    pub operator_response: OperatorResponse,
    pub countdown_remaining: i64,
    pub should_block: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardStatusResponse {
    pub agent_id: AgentId,
    pub pending_events: usize,
    pub events: Vec<GuardEventStatus>,
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: UserId,
    pub email: String,
    pub tier: Tier,
    /// Plain API key. Returned exactly once; only a hash is stored.
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyResponse {
    pub key_id: KeyId,
    pub api_key: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub user_id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub tier: Tier,
    pub scan_quota: i32,
    pub scan_used: i32,
    pub agent_quota: i32,
    pub cycle_end: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Queue payloads
// ---------------------------------------------------------------------------

/// Document pushed on `queue:typosquat` / `queue:leak`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJobPayload {
    pub job_id: JobId,
    pub domain: String,
    pub scan_type: ScanKind,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

/// Document pushed on `queue:guard`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardAlertPayload {
    pub event_id: EventId,
    pub agent_id: AgentId,
    pub hostname: String,
    pub anomaly_type: AnomalyKind,
    pub severity: Severity,
    pub target_ip: Option<String>,
    pub target_country: Option<String>,
    pub process_name: Option<String>,
    pub details: serde_json::Value,
    pub countdown_expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_truncation_respects_char_boundaries() {
        let ascii = "a".repeat(300);
        assert_eq!(truncate_snippet(&ascii).len(), 200);

        // Multi-byte char straddling the limit is dropped whole.
        let mut s = "a".repeat(199);
        s.push('é');
        let truncated = truncate_snippet(&s);
        assert_eq!(truncated.len(), 199);
        assert!(truncated.chars().all(|c| c == 'a'));
    }

    #[test]
    fn short_snippets_pass_through() {
        assert_eq!(truncate_snippet("password=hunter2"), "password=hunter2");
    }

    #[test]
    fn scan_payload_round_trips_as_json() {
        let payload = ScanJobPayload {
            job_id: JobId::new(),
            domain: "examplebank.com".into(),
            scan_type: ScanKind::Typosquat,
            priority: Priority::High,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        let back: ScanJobPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, payload.job_id);
        assert_eq!(back.scan_type, ScanKind::Typosquat);
        assert!(json.contains("\"scan_type\":\"typosquat\""));
    }

    #[test]
    fn guard_alert_request_accepts_missing_optionals() {
        let body = serde_json::json!({
            "agent_id": uuid::Uuid::new_v4(),
            "hostname": "vps-01",
            "anomaly_type": "process",
            "severity": "critical",
            "details": {"parent_pid": 812}
        });
        let req: GuardAlertRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.anomaly_type, AnomalyKind::Process);
        assert!(req.target_ip.is_none());
    }
}
