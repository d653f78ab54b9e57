//! Credential-leak detection worker.
//!
//! Consumes `queue:leak`: sweeps the code-search API for the target
//! domain next to each sensitive keyword, persists classified matches,
//! and fans out enriched alerts.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};

use sentinyl_core::config::Settings;
use sentinyl_core::db::{Database, NewLeak};
use sentinyl_core::enrich::{Enricher, Finding};
use sentinyl_core::leaks::LeakHunter;
use sentinyl_core::notify::Alert;
use sentinyl_core::queue::{JobQueue, QUEUE_LEAK};
use sentinyl_model::{ScanJobPayload, Severity};
use sentinyl_workers::{build_enricher, init_tracing, run_worker};

struct WorkerContext {
    db: Database,
    hunter: LeakHunter,
    enricher: Enricher,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("leak_worker=info,sentinyl_core=info");
    info!("Leak detection worker started");

    let settings = Settings::from_env()?;
    if settings.github_token.is_none() {
        warn!("No GITHUB_TOKEN configured - scans will be rate-limit constrained");
    }

    let db = Database::connect(&settings.database_url).await?;
    let queue = JobQueue::connect(&settings.redis_url).await?;

    let ctx = Arc::new(WorkerContext {
        db,
        hunter: LeakHunter::new(settings.github_token.clone()),
        enricher: build_enricher(&settings).await,
    });

    run_worker(&queue, QUEUE_LEAK, |payload: ScanJobPayload| {
        let ctx = ctx.clone();
        async move { process_job(&ctx, payload).await }
    })
    .await;

    Ok(())
}

async fn process_job(ctx: &WorkerContext, payload: ScanJobPayload) -> anyhow::Result<()> {
    let job_id = payload.job_id;
    let domain = payload.domain.clone();
    info!("Processing leak detection job {job_id} for domain: {domain}");

    if !ctx.db.jobs().mark_processing(job_id).await? {
        warn!("Job {job_id} is not pending, skipping redelivery");
        return Ok(());
    }

    match scan_domain(ctx, &payload).await {
        Ok((total, severe)) => {
            if total > 0 {
                send_summary(ctx, &domain, total, severe).await;
            }
            ctx.db.jobs().mark_completed(job_id).await?;
            info!("Job {job_id} completed successfully. Found {total} leaks");
            Ok(())
        }
        Err(e) => {
            ctx.db
                .jobs()
                .mark_failed(job_id, &format!("{e:#}"))
                .await
                .ok();
            Err(e)
        }
    }
}

/// Returns `(total_leaks, critical_or_high)`.
async fn scan_domain(
    ctx: &WorkerContext,
    payload: &ScanJobPayload,
) -> anyhow::Result<(usize, usize)> {
    let matches = ctx
        .hunter
        .scan(&payload.domain)
        .await
        .context("code search sweep")?;

    let mut severe = 0usize;
    let total = matches.len();

    for leak in matches {
        ctx.db
            .leaks()
            .insert(NewLeak {
                job_id: payload.job_id,
                domain: payload.domain.clone(),
                repository_url: leak.repository_url.clone(),
                repository_name: leak.repository_name.clone(),
                file_path: leak.file_path.clone(),
                snippet: leak.snippet.clone(),
                leak_kind: leak.leak_kind.clone(),
                severity: leak.severity,
                is_public: leak.is_public,
            })
            .await
            .context("persisting leak")?;

        if leak.severity.rank() >= Severity::High.rank() {
            severe += 1;
        }

        ctx.enricher
            .process(
                &Finding::Leak {
                    domain: payload.domain.clone(),
                    repository_name: leak.repository_name,
                    repository_url: leak.repository_url,
                    file_path: leak.file_path,
                    leak_kind: leak.leak_kind,
                    snippet: leak.snippet,
                    severity: leak.severity,
                },
                Utc::now(),
            )
            .await;
    }

    Ok((total, severe))
}

async fn send_summary(ctx: &WorkerContext, domain: &str, total: usize, severe: usize) {
    let alert = Alert {
        title: format!("Leak Scan Complete: {domain}"),
        severity: if severe > 0 {
            Severity::High
        } else {
            Severity::Medium
        },
        risk_score: if severe > 0 { 75 } else { 50 },
        framework_context: serde_json::json!({"mapped": false}),
        details: vec![
            ("Domain".to_string(), domain.to_string()),
            ("Potential Leaks".to_string(), total.to_string()),
            ("Critical/High".to_string(), severe.to_string()),
        ],
        action_buttons: Vec::new(),
    };
    ctx.enricher.fanout().send(&alert).await;
}
