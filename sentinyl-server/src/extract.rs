//! Bearer-token authentication extractor.
//!
//! Keys are validated in three steps: a format gate before any I/O, a
//! prefix-narrowed candidate lookup, and argon2 verification off the
//! async runtime. Error messages never distinguish "no such key" from
//! "wrong key" to keep enumeration blind.

use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};
use tracing::error;

use crate::errors::ApiError;
use crate::AppState;
use sentinyl_core::auth;
use sentinyl_model::User;

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?
            .trim()
            .to_string();

        if !auth::looks_like_api_key(&token) {
            return Err(ApiError::unauthorized("Invalid API key format"));
        }

        let candidates = state
            .db
            .accounts()
            .find_keys_by_prefix(auth::key_prefix(&token))
            .await?;

        // argon2 verification is CPU-bound; keep it off the async runtime.
        let matched = tokio::task::spawn_blocking(move || {
            candidates
                .into_iter()
                .find(|key| auth::verify_api_key(&token, &key.key_hash))
        })
        .await
        .map_err(|e| ApiError::internal(format!("key verification task failed: {e}")))?;

        let Some(matched) = matched else {
            return Err(ApiError::unauthorized("Invalid API key"));
        };

        state.db.accounts().touch_api_key(matched.id).await?;

        let user = state
            .db
            .accounts()
            .get_user(matched.user_id)
            .await?
            .ok_or_else(|| {
                error!("User not found for valid API key {}", matched.id);
                ApiError::unauthorized("Invalid API key")
            })?;

        if !user.active {
            return Err(ApiError::unauthorized("Invalid API key"));
        }

        Ok(CurrentUser { user })
    }
}
