//! Root, health, and platform statistics.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::errors::ApiResult;
use crate::extract::CurrentUser;
use crate::AppState;

pub async fn root() -> Json<Value> {
    Json(json!({
        "app": "Sentinyl",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "operational",
    }))
}

/// GET /health - database and queue connectivity.
pub async fn health(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let mut services = json!({});
    let mut healthy = true;

    match state.db.ping().await {
        Ok(()) => services["database"] = json!("connected"),
        Err(e) => {
            services["database"] = json!(format!("error: {e}"));
            healthy = false;
        }
    }

    match state.queue.ping().await {
        Ok(()) => services["redis"] = json!("connected"),
        Err(e) => {
            services["redis"] = json!(format!("error: {e}"));
            healthy = false;
        }
    }

    let body = Json(json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "services": services,
    }));

    if healthy {
        Ok(body)
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// GET /stats
pub async fn stats(
    State(state): State<AppState>,
    _caller: CurrentUser,
) -> ApiResult<Json<Value>> {
    Ok(Json(json!({
        "total_domains": state.db.domains().count_active().await?,
        "total_scans": state.db.jobs().count_all().await?,
        "pending_scans": state.db.jobs().count_pending().await?,
        "active_threats": state.db.threats().count_active().await?,
        "total_leaks": state.db.leaks().count_all().await?,
        "unnotified_threats": state.db.threats().count_unnotified().await?,
    })))
}
