//! Guard alert intake, operator verdicts, and the agent status poll.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{error, info};

use crate::errors::{ApiError, ApiResult};
use crate::extract::CurrentUser;
use crate::handlers::require_feature;
use crate::AppState;
use sentinyl_core::auth::Feature;
use sentinyl_core::db::NewGuardEvent;
use sentinyl_core::guard::{countdown_expiry, evaluate, status_for, EventState};
use sentinyl_core::queue::QUEUE_GUARD;
use sentinyl_model::{
    AgentId, GuardAlertPayload, GuardAlertRequest, GuardAlertResponse, GuardStatusResponse,
    GuardVerdictRequest, GuardVerdictResponse, JobStatus, COUNTDOWN_SECONDS,
};

/// POST /guard/alert
///
/// Upserts the agent under the caller, creates the event with its fixed
/// 300-second countdown, and enqueues the enrichment payload. The
/// countdown protocol does not depend on the queue, so a failed enqueue
/// only costs the notification.
pub async fn submit_alert(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(request): Json<GuardAlertRequest>,
) -> ApiResult<(StatusCode, Json<GuardAlertResponse>)> {
    let subscription = state
        .db
        .accounts()
        .subscription_for(caller.user.id)
        .await?;
    require_feature(&subscription, Feature::Guard)?;

    if !subscription.agents_unlimited() {
        let active = state.db.guard().count_active_agents(caller.user.id).await?;
        // An already-registered agent keeps alerting; only new ones count
        // against the quota.
        let known = state
            .db
            .guard()
            .agent_exists(request.agent_id, caller.user.id)
            .await?;
        if active >= subscription.agent_quota as i64 && !known {
            return Err(ApiError::new(
                StatusCode::PAYMENT_REQUIRED,
                serde_json::json!({
                    "error": "Agent quota exceeded",
                    "agents_active": active,
                    "quota_limit": subscription.agent_quota,
                    "upgrade_url": "/billing/subscribe?tier=full_stack",
                }),
            ));
        }
    }

    state
        .db
        .guard()
        .upsert_agent(
            request.agent_id,
            caller.user.id,
            &request.hostname,
            None,
            None,
        )
        .await?;

    let now = state.clock.now();
    let event = state
        .db
        .guard()
        .create_event(NewGuardEvent {
            agent_id: request.agent_id,
            anomaly_kind: request.anomaly_type,
            severity: request.severity,
            target_ip: request.target_ip.clone(),
            target_country: request.target_country.clone(),
            process_name: request.process_name.clone(),
            details: request.details.clone(),
            countdown_started_at: now,
            countdown_expires_at: countdown_expiry(now),
        })
        .await?;

    let payload = GuardAlertPayload {
        event_id: event.id,
        agent_id: request.agent_id,
        hostname: request.hostname,
        anomaly_type: request.anomaly_type,
        severity: request.severity,
        target_ip: request.target_ip,
        target_country: request.target_country,
        process_name: request.process_name,
        details: request.details,
        countdown_expires_at: event.countdown_expires_at,
    };

    if let Err(e) = state.queue.push(QUEUE_GUARD, &payload).await {
        error!(
            "Failed to enqueue guard alert {} for enrichment: {e}",
            event.id
        );
    }

    info!(
        "Guard alert accepted: event {} ({} on {})",
        event.id, event.anomaly_kind, event.agent_id
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(GuardAlertResponse {
            event_id: event.id,
            status: JobStatus::Pending,
            countdown_seconds: COUNTDOWN_SECONDS,
        }),
    ))
}

/// POST /guard/response
///
/// Inbound operator verdict (webhook callback). Idempotent for a repeated
/// identical verdict; a conflicting verdict is rejected.
pub async fn operator_verdict(
    State(state): State<AppState>,
    Json(request): Json<GuardVerdictRequest>,
) -> ApiResult<Json<GuardVerdictResponse>> {
    let event = state
        .db
        .guard()
        .record_verdict(request.event_id, request.response, &request.admin_user)
        .await?;

    info!(
        "Operator {} marked event {} as {}",
        request.admin_user, event.id, event.operator_response
    );

    Ok(Json(GuardVerdictResponse {
        status: "success".to_string(),
    }))
}

/// GET /guard/status/{agent_id}
///
/// The lazy half of the dead-man's switch: reading an expired, undecided
/// event materializes `blocked = true` before the status is computed.
pub async fn agent_status(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<GuardStatusResponse>> {
    let agent_id: AgentId = agent_id
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid agent_id format"))?;

    let now = state.clock.now();
    let events = state.db.guard().pending_for_agent(agent_id, now).await?;

    let mut statuses = Vec::with_capacity(events.len());
    for event in events {
        let state_now = evaluate(&event, now);

        // Auto-arm: persist the expiry the moment anyone observes it.
        if state_now == EventState::AutoBlocked && !event.blocked {
            state.db.guard().arm_expired(event.id, now).await?;
        }

        // Terminal states are considered delivered by this poll.
        if !event.acknowledged && state_now != EventState::Pending {
            state.db.guard().mark_acknowledged(event.id).await?;
        }

        statuses.push(status_for(&event, now));
    }

    let pending = statuses.iter().filter(|s| !s.should_block).count();

    Ok(Json(GuardStatusResponse {
        agent_id,
        pending_events: pending,
        events: statuses,
    }))
}
