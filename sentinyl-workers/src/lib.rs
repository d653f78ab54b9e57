//! Shared scaffolding for the Sentinyl queue workers.
//!
//! Each worker is an independent OS process owning a single consumer loop
//! against one named queue. The loop blocks on `BRPOP` with a 5-second
//! ceiling so `SIGINT` is observed promptly; an in-flight job is finished
//! before the loop exits.

use std::future::Future;

use serde::de::DeserializeOwned;
use tracing::{error, info};

use sentinyl_core::queue::JobQueue;

/// Consume `queue_name` until SIGINT. `handle` owns the full lifecycle of
/// one payload; its errors are logged here and never kill the loop.
pub async fn run_worker<T, H, Fut>(queue: &JobQueue, queue_name: &str, handle: H)
where
    T: DeserializeOwned,
    H: Fn(T) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    info!("Listening on queue: {queue_name}");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Worker shutting down...");
                break;
            }
            popped = queue.pop_blocking::<T>(queue_name) => {
                match popped {
                    Ok(Some(payload)) => {
                        if let Err(e) = handle(payload).await {
                            error!("Job processing failed: {e:#}");
                        }
                    }
                    Ok(None) => {} // pop timeout; loop to observe shutdown
                    Err(e) => {
                        error!("Worker error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                }
            }
        }
    }
}

/// Tracing setup shared by the worker binaries.
pub fn init_tracing(default_directive: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the enrichment pipeline from the environment: graph if
/// reachable, whichever channels have webhooks, and the public API base
/// for operator action buttons.
pub async fn build_enricher(
    settings: &sentinyl_core::config::Settings,
) -> sentinyl_core::enrich::Enricher {
    use sentinyl_core::enrich::{Enricher, GraphStore, HttpGraphStore, NoopGraph};
    use sentinyl_core::notify::AlertFanout;
    use std::sync::Arc;

    let graph: Arc<dyn GraphStore> = match &settings.graph_url {
        Some(url) => match HttpGraphStore::connect(
            url,
            settings.graph_user.as_deref(),
            settings.graph_password.as_deref(),
        )
        .await
        {
            Some(store) => Arc::new(store),
            None => Arc::new(NoopGraph),
        },
        None => Arc::new(NoopGraph),
    };

    let fanout = AlertFanout::from_settings(settings);

    let api_base = std::env::var("API_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:8000".to_string());

    Enricher::new(graph, fanout).with_api_base(api_base)
}
