//! Dead-man's-switch client: alert submission, verdict polling, and the
//! local event table.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::firewall::Firewall;
use crate::sensors::Anomaly;
use sentinyl_model::{
    AgentId, EventId, GuardAlertRequest, GuardAlertResponse, GuardEventStatus,
    GuardStatusResponse, OperatorResponse, COUNTDOWN_SECONDS,
};

/// What the agent does with one event from a status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAction {
    /// Operator said safe: drop the local record, touch nothing.
    Discard,
    /// Verdict or expiry says block: sever the peer, then drop.
    Block,
    /// Countdown still running.
    Wait,
}

/// Pure decision function over one polled event.
pub fn decide(status: &GuardEventStatus) -> AgentAction {
    if status.operator_response == OperatorResponse::Safe {
        AgentAction::Discard
    } else if status.should_block {
        AgentAction::Block
    } else {
        AgentAction::Wait
    }
}

#[derive(Debug, Clone)]
struct ActiveEvent {
    anomaly: Anomaly,
    expires_at: DateTime<Utc>,
}

pub struct DeadManSwitchClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    agent_id: AgentId,
    hostname: String,
    active_events: HashMap<EventId, ActiveEvent>,
}

impl DeadManSwitchClient {
    pub fn new(api_url: String, api_key: String, agent_id: AgentId, hostname: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            agent_id,
            hostname,
            active_events: HashMap::new(),
        }
    }

    /// Report one anomaly; on 202 the event is tracked locally until its
    /// countdown lapses or the verdict lands.
    pub async fn send_alert(&mut self, anomaly: &Anomaly) -> anyhow::Result<Option<EventId>> {
        let request = GuardAlertRequest {
            agent_id: self.agent_id,
            hostname: self.hostname.clone(),
            anomaly_type: anomaly.kind,
            severity: anomaly.severity,
            target_ip: anomaly.target_ip.clone(),
            target_country: anomaly.target_country.clone(),
            process_name: anomaly.process_name.clone(),
            details: anomaly.details.clone(),
        };

        let response = self
            .http
            .post(format!("{}/guard/alert", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::ACCEPTED {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Failed to send alert: {status} {body}");
            return Ok(None);
        }

        let accepted: GuardAlertResponse = response.json().await?;
        info!("Alert sent successfully. Event ID: {}", accepted.event_id);

        self.active_events.insert(
            accepted.event_id,
            ActiveEvent {
                anomaly: anomaly.clone(),
                expires_at: Utc::now() + chrono::Duration::seconds(COUNTDOWN_SECONDS),
            },
        );

        Ok(Some(accepted.event_id))
    }

    /// Poll the control plane and act on each tracked event.
    pub async fn check_for_override<F: Firewall>(&mut self, firewall: &F) -> anyhow::Result<()> {
        if self.active_events.is_empty() {
            return Ok(());
        }

        let response = self
            .http
            .get(format!("{}/guard/status/{}", self.api_url, self.agent_id))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            warn!("Status poll returned {}", response.status());
            return Ok(());
        }

        let status: GuardStatusResponse = response.json().await?;

        for event in &status.events {
            let Some(active) = self.active_events.get(&event.event_id) else {
                continue;
            };

            match decide(event) {
                AgentAction::Discard => {
                    info!(
                        "Event {} marked as SAFE by operator - no action taken",
                        event.event_id
                    );
                    self.active_events.remove(&event.event_id);
                }
                AgentAction::Block => {
                    warn!(
                        "Event {} requires BLOCK - installing firewall rules",
                        event.event_id
                    );
                    match &active.anomaly.target_ip {
                        Some(target_ip) => firewall.block_peer(target_ip).await,
                        None => error!("Cannot block event {}: no target IP", event.event_id),
                    }
                    self.active_events.remove(&event.event_id);
                }
                AgentAction::Wait => {
                    info!(
                        "Event {} countdown: {}s remaining",
                        event.event_id, event.countdown_remaining
                    );
                }
            }
        }

        Ok(())
    }

    /// Drop local records whose countdown has lapsed; the control plane
    /// owns the authoritative outcome past that point.
    pub fn collect_expired(&mut self) {
        let now = Utc::now();
        self.active_events.retain(|_, event| event.expires_at >= now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinyl_model::{AnomalyKind, Severity};

    fn status(
        response: OperatorResponse,
        should_block: bool,
        countdown_remaining: i64,
    ) -> GuardEventStatus {
        GuardEventStatus {
            event_id: EventId::new(),
            anomaly_type: AnomalyKind::Geo,
            severity: Severity::Critical,
            target_ip: Some("185.220.101.1".to_string()),
            target_country: Some("Russia".to_string()),
            process_name: None,
            operator_response: response,
            countdown_remaining,
            should_block,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn safe_verdicts_discard_without_blocking() {
        assert_eq!(
            decide(&status(OperatorResponse::Safe, false, 0)),
            AgentAction::Discard
        );
        // Safe wins even if the flags disagree; verdict is checked first.
        assert_eq!(
            decide(&status(OperatorResponse::Safe, true, 0)),
            AgentAction::Discard
        );
    }

    #[test]
    fn block_flag_triggers_the_block_action() {
        assert_eq!(
            decide(&status(OperatorResponse::Block, true, 120)),
            AgentAction::Block
        );
        // Auto-block: no verdict but the countdown hit zero.
        assert_eq!(
            decide(&status(OperatorResponse::None, true, 0)),
            AgentAction::Block
        );
    }

    #[test]
    fn running_countdowns_wait() {
        assert_eq!(
            decide(&status(OperatorResponse::None, false, 240)),
            AgentAction::Wait
        );
    }
}
