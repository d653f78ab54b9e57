//! Dead-man's-switch evaluation.
//!
//! The controller is stateless beyond the persisted events: no timers are
//! armed, and the countdown is a pure function of the wall clock and
//! `countdown_expires_at`. Expiry is materialized whenever anyone reads
//! the event. The operator verdict is always checked before the lazy
//! expiry rule, so a `safe` recorded after expiry but before the next
//! poll still wins.

use chrono::{DateTime, Duration, Utc};

use sentinyl_model::{GuardEvent, GuardEventStatus, OperatorResponse, COUNTDOWN_SECONDS};

/// Terminal/pending state of one event at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// Countdown running, no verdict yet.
    Pending,
    /// Operator verdict: stand down.
    Safe,
    /// Operator verdict: sever the peer.
    Blocked,
    /// Countdown lapsed with no verdict.
    AutoBlocked,
}

pub fn countdown_expiry(started_at: DateTime<Utc>) -> DateTime<Utc> {
    started_at + Duration::seconds(COUNTDOWN_SECONDS)
}

pub fn countdown_remaining(event: &GuardEvent, now: DateTime<Utc>) -> i64 {
    (event.countdown_expires_at - now).num_seconds().max(0)
}

/// Evaluate the state machine. Verdicts take precedence over expiry.
pub fn evaluate(event: &GuardEvent, now: DateTime<Utc>) -> EventState {
    match event.operator_response {
        OperatorResponse::Safe => EventState::Safe,
        OperatorResponse::Block => EventState::Blocked,
        OperatorResponse::None => {
            if now >= event.countdown_expires_at {
                EventState::AutoBlocked
            } else {
                EventState::Pending
            }
        }
    }
}

pub fn should_block(event: &GuardEvent, now: DateTime<Utc>) -> bool {
    matches!(
        evaluate(event, now),
        EventState::Blocked | EventState::AutoBlocked
    )
}

/// Wire representation of an event for the agent status poll.
pub fn status_for(event: &GuardEvent, now: DateTime<Utc>) -> GuardEventStatus {
    GuardEventStatus {
        event_id: event.id,
        anomaly_type: event.anomaly_kind,
        severity: event.severity,
        target_ip: event.target_ip.clone(),
        target_country: event.target_country.clone(),
        process_name: event.process_name.clone(),
        operator_response: event.operator_response,
        countdown_remaining: countdown_remaining(event, now),
        should_block: should_block(event, now),
        created_at: event.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinyl_model::{AgentId, AnomalyKind, EventId, Severity};

    fn event_at(created: DateTime<Utc>, response: OperatorResponse) -> GuardEvent {
        GuardEvent {
            id: EventId::new(),
            agent_id: AgentId::new(),
            anomaly_kind: AnomalyKind::Geo,
            severity: Severity::Critical,
            target_ip: Some("185.220.101.1".to_string()),
            target_country: Some("Russia".to_string()),
            process_name: None,
            details: serde_json::json!({}),
            countdown_started_at: created,
            countdown_expires_at: countdown_expiry(created),
            operator_response: response,
            operator_user: None,
            responded_at: None,
            blocked: false,
            acknowledged: false,
            created_at: created,
        }
    }

    #[test]
    fn countdown_is_fixed_at_five_minutes() {
        let created = Utc::now();
        let event = event_at(created, OperatorResponse::None);
        assert_eq!(
            (event.countdown_expires_at - event.countdown_started_at).num_seconds(),
            300
        );
    }

    #[test]
    fn pending_until_expiry_then_auto_blocked() {
        let created = Utc::now();
        let event = event_at(created, OperatorResponse::None);

        let before = created + Duration::seconds(299);
        assert_eq!(evaluate(&event, before), EventState::Pending);
        assert!(!should_block(&event, before));
        assert_eq!(countdown_remaining(&event, before), 1);

        let at_expiry = created + Duration::seconds(300);
        assert_eq!(evaluate(&event, at_expiry), EventState::AutoBlocked);
        assert!(should_block(&event, at_expiry));
        assert_eq!(countdown_remaining(&event, at_expiry), 0);
    }

    #[test]
    fn safe_verdict_wins_even_after_expiry() {
        let created = Utc::now();
        let event = event_at(created, OperatorResponse::Safe);

        // Read well past the expiry: the verdict is checked first.
        let late = created + Duration::seconds(400);
        assert_eq!(evaluate(&event, late), EventState::Safe);
        assert!(!should_block(&event, late));
    }

    #[test]
    fn block_verdict_blocks_before_expiry() {
        let created = Utc::now();
        let event = event_at(created, OperatorResponse::Block);

        let early = created + Duration::seconds(10);
        assert_eq!(evaluate(&event, early), EventState::Blocked);
        assert!(should_block(&event, early));
    }

    #[test]
    fn status_reflects_state_under_every_ordering() {
        let created = Utc::now();

        // Order A: poll first (pending), verdict later.
        let undecided = event_at(created, OperatorResponse::None);
        let early = status_for(&undecided, created + Duration::seconds(60));
        assert!(!early.should_block);
        assert_eq!(early.countdown_remaining, 240);

        // Order B: verdict recorded, then the late poll.
        let safed = event_at(created, OperatorResponse::Safe);
        let late = status_for(&safed, created + Duration::seconds(400));
        assert!(!late.should_block);
        assert_eq!(late.operator_response, OperatorResponse::Safe);

        // Order C: no verdict ever; the late poll arms the block.
        let late = status_for(&undecided, created + Duration::seconds(400));
        assert!(late.should_block);
        assert_eq!(late.countdown_remaining, 0);
    }
}
