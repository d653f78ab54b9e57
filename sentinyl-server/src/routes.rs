use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::handlers::{accounts, guard, scan, system};
use crate::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = build_cors(&state.settings.allowed_origins);

    Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health))
        .route("/stats", get(system::stats))
        .route("/scan", post(scan::submit_scan))
        .route("/results/{job_id}", get(scan::get_results))
        .route("/guard/alert", post(guard::submit_alert))
        .route("/guard/response", post(guard::operator_verdict))
        .route("/guard/status/{agent_id}", get(guard::agent_status))
        .route("/auth/register", post(accounts::register))
        .route("/auth/me", get(accounts::me))
        .route("/auth/keys", post(accounts::create_key))
        .route("/auth/keys/{key_id}", delete(accounts::revoke_key))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring unparseable CORS origin: {origin}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}
