//! Registration, account introspection, and API key management.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::errors::{ApiError, ApiResult};
use crate::extract::CurrentUser;
use crate::AppState;
use sentinyl_core::auth::mint_api_key;
use sentinyl_model::{
    AccountResponse, ApiKeyResponse, KeyId, RegisterRequest, RegisterResponse, Tier,
};

/// POST /auth/register
///
/// Creates the user, a free-tier subscription, and the first API key.
/// The plain key appears in this response and nowhere else, ever.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let email = request.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address"));
    }

    let user = state
        .db
        .accounts()
        .create_user(&email, request.name.as_deref())
        .await?;

    state
        .db
        .accounts()
        .create_subscription(user.id, Tier::Free)
        .await?;

    let minted = mint_api_key()?;
    state
        .db
        .accounts()
        .insert_api_key(user.id, &minted.prefix, &minted.hash, Some("default"))
        .await?;

    info!("Registered user {}", user.email);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            email: user.email,
            tier: Tier::Free,
            api_key: minted.plain,
        }),
    ))
}

/// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> ApiResult<Json<AccountResponse>> {
    let subscription = state
        .db
        .accounts()
        .subscription_for(caller.user.id)
        .await?;

    Ok(Json(AccountResponse {
        user_id: caller.user.id,
        email: caller.user.email,
        name: caller.user.name,
        tier: subscription.tier,
        scan_quota: subscription.scan_quota,
        scan_used: subscription.scan_used,
        agent_quota: subscription.agent_quota,
        cycle_end: subscription.cycle_end,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub label: Option<String>,
}

/// POST /auth/keys
pub async fn create_key(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(request): Json<CreateKeyRequest>,
) -> ApiResult<(StatusCode, Json<ApiKeyResponse>)> {
    let minted = mint_api_key()?;
    let stored = state
        .db
        .accounts()
        .insert_api_key(
            caller.user.id,
            &minted.prefix,
            &minted.hash,
            request.label.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyResponse {
            key_id: stored.id,
            api_key: minted.plain,
            label: stored.label,
        }),
    ))
}

/// DELETE /auth/keys/{key_id}
pub async fn revoke_key(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(key_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let key_id: KeyId = key_id
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid key id"))?;

    state
        .db
        .accounts()
        .revoke_api_key(key_id, caller.user.id)
        .await?;

    Ok(Json(serde_json::json!({ "status": "revoked" })))
}
