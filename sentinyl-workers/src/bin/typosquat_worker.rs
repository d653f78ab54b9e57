//! Typosquat detection worker.
//!
//! Consumes `queue:typosquat`: generates candidate domains, resolves them
//! with bounded concurrency, persists every active registration as a
//! threat, and fans out an enriched alert per hit plus one summary at the
//! end of the scan.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};

use sentinyl_core::config::Settings;
use sentinyl_core::db::{Database, NewThreat};
use sentinyl_core::enrich::{Enricher, Finding};
use sentinyl_core::fuzzer::DomainFuzzer;
use sentinyl_core::notify::Alert;
use sentinyl_core::queue::{JobQueue, QUEUE_TYPOSQUAT};
use sentinyl_core::resolve::{build_resolver, scan_candidates, TokioResolver};
use sentinyl_model::{ScanJobPayload, Severity};
use sentinyl_workers::{build_enricher, init_tracing, run_worker};

struct WorkerContext {
    db: Database,
    resolver: Arc<TokioResolver>,
    enricher: Enricher,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("typosquat_worker=info,sentinyl_core=info");
    info!("Typosquat worker started");

    let settings = Settings::from_env()?;
    let db = Database::connect(&settings.database_url).await?;
    let queue = JobQueue::connect(&settings.redis_url).await?;

    let ctx = Arc::new(WorkerContext {
        db,
        resolver: Arc::new(build_resolver()),
        enricher: build_enricher(&settings).await,
    });

    run_worker(&queue, QUEUE_TYPOSQUAT, |payload: ScanJobPayload| {
        let ctx = ctx.clone();
        async move { process_job(&ctx, payload).await }
    })
    .await;

    Ok(())
}

async fn process_job(ctx: &WorkerContext, payload: ScanJobPayload) -> anyhow::Result<()> {
    let job_id = payload.job_id;
    let domain = payload.domain.clone();
    info!("Processing typosquat job {job_id} for domain: {domain}");

    if !ctx.db.jobs().mark_processing(job_id).await? {
        warn!("Job {job_id} is not pending, skipping redelivery");
        return Ok(());
    }

    match scan_domain(ctx, &payload).await {
        Ok((total, critical)) => {
            if total > 0 {
                send_summary(ctx, &domain, total, critical).await;
            }
            ctx.db.jobs().mark_completed(job_id).await?;
            info!("Job {job_id} completed: {total} active threats");
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

/// Returns `(total_threats, critical_threats)`.
async fn scan_domain(
    ctx: &WorkerContext,
    payload: &ScanJobPayload,
) -> anyhow::Result<(usize, usize)> {
    let fuzzer = DomainFuzzer::new(&payload.domain);
    let candidates = fuzzer.generate_variations();
    info!(
        "Scanning {} candidate domains for {}",
        candidates.len(),
        fuzzer.domain()
    );

    let mut hits = scan_candidates(ctx.resolver.clone(), candidates);
    let mut total = 0usize;

    while let Some(hit) = hits.recv().await {
        warn!(
            "Active threat detected: {} -> {:?}",
            hit.domain, hit.ip_addresses
        );

        let ip_address = hit.ip_addresses.first().cloned();
        ctx.db
            .threats()
            .insert(NewThreat {
                job_id: payload.job_id,
                original_domain: payload.domain.clone(),
                malicious_domain: hit.domain.clone(),
                severity: Severity::Critical,
                ip_address: ip_address.clone(),
                nameservers: hit.nameservers.clone(),
            })
            .await
            .context("persisting threat")?;

        // Alert immediately; waiting for scan completion would sit on a
        // live phishing domain for minutes.
        ctx.enricher
            .process(
                &Finding::Typosquat {
                    original_domain: payload.domain.clone(),
                    malicious_domain: hit.domain,
                    ip_address,
                    nameservers: hit.nameservers,
                },
                Utc::now(),
            )
            .await;

        total += 1;
    }

    // Every resolved typosquat is recorded critical.
    Ok((total, total))
}

async fn send_summary(ctx: &WorkerContext, domain: &str, total: usize, critical: usize) {
    let alert = Alert {
        title: format!("Typosquat Scan Complete: {domain}"),
        severity: if critical > 0 {
            Severity::High
        } else {
            Severity::Medium
        },
        risk_score: if critical > 0 { 75 } else { 50 },
        framework_context: serde_json::json!({"mapped": false}),
        details: vec![
            ("Domain".to_string(), domain.to_string()),
            ("Active Threats".to_string(), total.to_string()),
            ("Critical".to_string(), critical.to_string()),
        ],
        action_buttons: Vec::new(),
    };
    ctx.enricher.fanout().send(&alert).await;
}
