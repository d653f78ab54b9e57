//! Guard alert enrichment worker.
//!
//! Consumes `queue:guard` and fans out operator-facing notifications with
//! the live countdown and MARK AS SAFE / CONFIRM BLOCK buttons. The
//! dead-man's-switch countdown itself lives in the store and the agent
//! poll; this worker only carries the human-facing side.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use sentinyl_core::config::Settings;
use sentinyl_core::enrich::{Enricher, Finding};
use sentinyl_core::queue::{JobQueue, QUEUE_GUARD};
use sentinyl_model::GuardAlertPayload;
use sentinyl_workers::{build_enricher, init_tracing, run_worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("guard_worker=info,sentinyl_core=info");
    info!("Guard alert worker started");

    let settings = Settings::from_env()?;
    let queue = JobQueue::connect(&settings.redis_url).await?;
    let enricher = Arc::new(build_enricher(&settings).await);

    run_worker(&queue, QUEUE_GUARD, |payload: GuardAlertPayload| {
        let enricher = enricher.clone();
        async move { process_alert(&enricher, payload).await }
    })
    .await;

    Ok(())
}

async fn process_alert(enricher: &Enricher, payload: GuardAlertPayload) -> anyhow::Result<()> {
    info!(
        "Processing guard alert {}: {} from {}",
        payload.event_id, payload.anomaly_type, payload.hostname
    );

    let countdown_remaining = (payload.countdown_expires_at - Utc::now())
        .num_seconds()
        .max(0);

    let outcome = enricher
        .process(
            &Finding::Guard {
                event_id: payload.event_id,
                hostname: payload.hostname,
                anomaly_kind: payload.anomaly_type,
                severity: payload.severity,
                target_ip: payload.target_ip,
                target_country: payload.target_country,
                process_name: payload.process_name,
                countdown_remaining_secs: countdown_remaining,
            },
            Utc::now(),
        )
        .await;

    info!(
        "Guard alert {} fanned out (risk {}, alerted: {})",
        payload.event_id, outcome.risk_score, outcome.alerted
    );

    Ok(())
}
