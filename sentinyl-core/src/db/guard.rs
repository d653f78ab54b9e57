use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::error::{Result, SentinylError};
use sentinyl_model::{
    AgentId, AnomalyKind, EventId, GuardAgent, GuardEvent, OperatorResponse, Severity, UserId,
};

/// Insert payload for a guard event. The countdown pair is computed by the
/// caller from the injected clock so it stays testable.
#[derive(Debug, Clone)]
pub struct NewGuardEvent {
    pub agent_id: AgentId,
    pub anomaly_kind: AnomalyKind,
    pub severity: Severity,
    pub target_ip: Option<String>,
    pub target_country: Option<String>,
    pub process_name: Option<String>,
    pub details: serde_json::Value,
    pub countdown_started_at: DateTime<Utc>,
    pub countdown_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GuardRepo {
    pool: PgPool,
}

impl GuardRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// First alert from an agent id creates the row under the caller;
    /// later alerts refresh the heartbeat and last-seen fields.
    pub async fn upsert_agent(
        &self,
        id: AgentId,
        user_id: UserId,
        hostname: &str,
        last_ip: Option<&str>,
        os_info: Option<&str>,
    ) -> Result<GuardAgent> {
        let agent = sqlx::query_as::<_, GuardAgent>(
            r#"
            INSERT INTO guard_agents (id, user_id, hostname, last_ip, os_info, last_heartbeat)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (id) DO UPDATE
            SET hostname = EXCLUDED.hostname,
                last_ip = COALESCE(EXCLUDED.last_ip, guard_agents.last_ip),
                os_info = COALESCE(EXCLUDED.os_info, guard_agents.os_info),
                last_heartbeat = NOW()
            RETURNING id, user_id, hostname, last_ip, os_info, last_heartbeat,
                      active, created_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(hostname)
        .bind(last_ip)
        .bind(os_info)
        .fetch_one(&self.pool)
        .await?;

        Ok(agent)
    }

    pub async fn agent_exists(&self, id: AgentId, user_id: UserId) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM guard_agents WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn count_active_agents(&self, user_id: UserId) -> Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM guard_agents WHERE user_id = $1 AND active = TRUE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn create_event(&self, new: NewGuardEvent) -> Result<GuardEvent> {
        let event = sqlx::query_as::<_, GuardEvent>(
            r#"
            INSERT INTO guard_events (
                id, agent_id, anomaly_kind, severity, target_ip, target_country,
                process_name, details, countdown_started_at, countdown_expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, agent_id, anomaly_kind, severity, target_ip, target_country,
                      process_name, details, countdown_started_at, countdown_expires_at,
                      operator_response, operator_user, responded_at, blocked,
                      acknowledged, created_at
            "#,
        )
        .bind(EventId::new())
        .bind(new.agent_id)
        .bind(new.anomaly_kind.as_str())
        .bind(new.severity.as_str())
        .bind(&new.target_ip)
        .bind(&new.target_country)
        .bind(&new.process_name)
        .bind(&new.details)
        .bind(new.countdown_started_at)
        .bind(new.countdown_expires_at)
        .fetch_one(&self.pool)
        .await?;

        info!(
            "Created guard event {} ({}, {})",
            event.id, event.anomaly_kind, event.severity
        );
        Ok(event)
    }

    pub async fn get_event(&self, id: EventId) -> Result<Option<GuardEvent>> {
        let event = sqlx::query_as::<_, GuardEvent>(
            r#"
            SELECT id, agent_id, anomaly_kind, severity, target_ip, target_country,
                   process_name, details, countdown_started_at, countdown_expires_at,
                   operator_response, operator_user, responded_at, blocked,
                   acknowledged, created_at
            FROM guard_events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    /// Record the operator verdict. A verdict only lands on an undecided
    /// event; a repeat of the same verdict is an idempotent no-op and a
    /// different verdict is rejected as a conflict. A `safe` verdict also
    /// clears `blocked` so a pre-expiry auto-arm cannot outlive it.
    pub async fn record_verdict(
        &self,
        id: EventId,
        response: OperatorResponse,
        operator_user: &str,
    ) -> Result<GuardEvent> {
        if response == OperatorResponse::None {
            return Err(SentinylError::Validation(
                "verdict must be 'safe' or 'block'".to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, GuardEvent>(
            r#"
            UPDATE guard_events
            SET operator_response = $2,
                operator_user = $3,
                responded_at = NOW(),
                blocked = ($2::text = 'block')
            WHERE id = $1 AND operator_response = 'none'
            RETURNING id, agent_id, anomaly_kind, severity, target_ip, target_country,
                      process_name, details, countdown_started_at, countdown_expires_at,
                      operator_response, operator_user, responded_at, blocked,
                      acknowledged, created_at
            "#,
        )
        .bind(id)
        .bind(response.as_str())
        .bind(operator_user)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(event) = updated {
            info!("Guard event {} verdict: {}", id, response);
            return Ok(event);
        }

        // No undecided row was updated; distinguish repeat from conflict.
        match self.get_event(id).await? {
            None => Err(SentinylError::NotFound(format!("guard event {id} not found"))),
            Some(event) if event.operator_response == response => Ok(event),
            Some(event) => Err(SentinylError::Conflict(format!(
                "guard event {id} already resolved as {}",
                event.operator_response
            ))),
        }
    }

    /// Events an agent must still know about: countdown running, an
    /// explicit block verdict, or anything it has not yet acknowledged.
    pub async fn pending_for_agent(
        &self,
        agent_id: AgentId,
        now: DateTime<Utc>,
    ) -> Result<Vec<GuardEvent>> {
        let events = sqlx::query_as::<_, GuardEvent>(
            r#"
            SELECT id, agent_id, anomaly_kind, severity, target_ip, target_country,
                   process_name, details, countdown_started_at, countdown_expires_at,
                   operator_response, operator_user, responded_at, blocked,
                   acknowledged, created_at
            FROM guard_events
            WHERE agent_id = $1
              AND (countdown_expires_at > $2
                   OR operator_response = 'block'
                   OR acknowledged = FALSE)
            ORDER BY created_at
            "#,
        )
        .bind(agent_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Materialize an expired countdown as `blocked = TRUE`. The guards
    /// make this idempotent and keep it from clobbering a concurrent
    /// `safe` verdict.
    pub async fn arm_expired(&self, id: EventId, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE guard_events
            SET blocked = TRUE
            WHERE id = $1
              AND operator_response = 'none'
              AND blocked = FALSE
              AND countdown_expires_at <= $2
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let armed = result.rows_affected() > 0;
        if armed {
            info!("Guard event {} auto-armed (countdown expired)", id);
        }
        Ok(armed)
    }

    /// Delivery of a terminal state counts as acknowledgment; the event
    /// drops out of subsequent polls once its countdown has also lapsed.
    pub async fn mark_acknowledged(&self, id: EventId) -> Result<()> {
        sqlx::query("UPDATE guard_events SET acknowledged = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
