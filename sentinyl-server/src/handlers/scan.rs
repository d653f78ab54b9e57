//! Scan submission and result read-back.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use tracing::{error, info};

use crate::errors::{ApiError, ApiResult};
use crate::extract::CurrentUser;
use crate::handlers::require_feature;
use crate::AppState;
use sentinyl_core::auth::Feature;
use sentinyl_core::queue::queue_for;
use sentinyl_model::{
    JobId, JobStatusResponse, ScanJobPayload, ScanKind, ScanRequest, ScanResponse,
};

/// Trim and case-fold a submitted domain; reject anything without a dot.
pub fn normalize_domain(raw: &str) -> Result<String, ApiError> {
    let domain = raw.trim().to_lowercase();
    if domain.is_empty() || !domain.contains('.') {
        return Err(ApiError::bad_request("Invalid domain format"));
    }
    Ok(domain)
}

/// POST /scan
///
/// Admission order: tier gate, atomic quota consume, then the job record.
/// The enqueue must succeed before we answer `accepted`; when it does
/// not, the job flips to `failed` and the transport error surfaces.
pub async fn submit_scan(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(request): Json<ScanRequest>,
) -> ApiResult<(StatusCode, Json<ScanResponse>)> {
    let domain = normalize_domain(&request.domain)?;
    let priority = request.priority.unwrap_or_default();

    let subscription = state
        .db
        .accounts()
        .subscription_for(caller.user.id)
        .await?;
    require_feature(&subscription, Feature::Scout)?;

    if let Err(exceeded) = state.db.accounts().try_consume_scan(caller.user.id).await? {
        return Err(ApiError::new(
            StatusCode::PAYMENT_REQUIRED,
            serde_json::json!({
                "error": "Scan quota exceeded",
                "quota_used": exceeded.quota_used,
                "quota_limit": exceeded.quota_limit,
                "resets_at": exceeded.resets_at,
                "upgrade_url": "/billing/subscribe?tier=scout_pro",
            }),
        ));
    }

    let domain_record = state
        .db
        .domains()
        .get_or_create(&domain, caller.user.id, priority)
        .await?;

    let job = state
        .db
        .jobs()
        .create(domain_record.id, request.scan_type)
        .await?;

    let payload = ScanJobPayload {
        job_id: job.id,
        domain: domain.clone(),
        scan_type: request.scan_type,
        priority,
        created_at: Utc::now(),
    };

    if let Err(e) = state
        .queue
        .push(queue_for(request.scan_type), &payload)
        .await
    {
        error!("Failed to enqueue job {}: {e}", job.id);
        state
            .db
            .jobs()
            .mark_failed(job.id, &format!("enqueue failed: {e}"))
            .await?;
        return Err(e.into());
    }

    info!(
        "Queued {} scan {} for {}",
        request.scan_type, job.id, domain
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(ScanResponse {
            job_id: job.id,
            domain,
            scan_type: request.scan_type,
            status: job.status,
            message: "Scan job created and queued for processing".to_string(),
        }),
    ))
}

/// GET /results/{job_id}
pub async fn get_results(
    State(state): State<AppState>,
    _caller: CurrentUser,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id: JobId = job_id
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid job_id format"))?;

    let (job, domain) = state
        .db
        .jobs()
        .get_with_domain(job_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    let mut response = JobStatusResponse {
        job_id: job.id,
        domain,
        job_type: job.kind,
        status: job.status,
        started_at: job.started_at,
        completed_at: job.completed_at,
        threats: Vec::new(),
        leaks: Vec::new(),
        error_message: job.error_message,
    };

    match job.kind {
        ScanKind::Typosquat => {
            response.threats = state
                .db
                .threats()
                .list_for_job(job.id)
                .await?
                .into_iter()
                .map(Into::into)
                .collect();
        }
        ScanKind::Leak => {
            // Snippets are truncated to 200 bytes at this boundary.
            response.leaks = state
                .db
                .leaks()
                .list_for_job(job.id)
                .await?
                .into_iter()
                .map(Into::into)
                .collect();
        }
    }

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_are_trimmed_and_case_folded() {
        assert_eq!(
            normalize_domain("  ExampleBank.COM ").unwrap(),
            "examplebank.com"
        );
    }

    #[test]
    fn dotless_or_empty_domains_are_rejected() {
        assert!(normalize_domain("examplebank").is_err());
        assert!(normalize_domain("   ").is_err());
    }
}
