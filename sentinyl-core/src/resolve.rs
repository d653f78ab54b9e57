//! DNS resolution stage of the typosquat scan.
//!
//! Each candidate gets an A lookup (and, on a hit, an NS lookup) with a
//! 3-second per-query timeout and two retries behind a 1-second doubling
//! backoff. NXDOMAIN, empty answers, and exhausted retries are all
//! negative results. The outer loop is paced to roughly ten resolutions
//! per second to protect public resolvers, with at most 16 in flight.

use std::sync::Arc;
use std::time::Duration;

use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
pub use hickory_resolver::TokioResolver;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

/// Maximum candidates resolving concurrently.
pub const DNS_CONCURRENCY: usize = 16;

/// Delay between candidate dispatches (~10/s).
pub const RESOLVE_PACING: Duration = Duration::from_millis(100);

const QUERY_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_RETRIES: u32 = 2;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// A candidate that resolved: an active typosquat registration.
#[derive(Debug, Clone)]
pub struct ResolvedCandidate {
    pub domain: String,
    pub ip_addresses: Vec<String>,
    pub nameservers: Vec<String>,
}

/// System-configured resolver with the scan's timeout discipline.
pub fn build_resolver() -> TokioResolver {
    let mut builder = match TokioResolver::builder_tokio() {
        Ok(builder) => builder,
        Err(e) => {
            warn!("System resolver config unavailable ({e}), using defaults");
            TokioResolver::builder_with_config(
                ResolverConfig::default(),
                TokioConnectionProvider::default(),
            )
        }
    };

    let opts = builder.options_mut();
    opts.timeout = QUERY_TIMEOUT;
    // Retries are driven by the backoff loop below, not the resolver.
    opts.attempts = 1;

    builder.build()
}

/// Resolve one candidate. `None` means "not registered" in every flavor:
/// NXDOMAIN, no A records, or timeouts that outlived the retry budget.
pub async fn resolve_candidate(
    resolver: &TokioResolver,
    domain: &str,
) -> Option<ResolvedCandidate> {
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 0..=MAX_RETRIES {
        match resolver.lookup_ip(domain).await {
            Ok(lookup) => {
                let ip_addresses: Vec<String> =
                    lookup.iter().map(|addr| addr.to_string()).collect();
                if ip_addresses.is_empty() {
                    return None;
                }

                let nameservers = match resolver.ns_lookup(domain).await {
                    Ok(ns) => ns.iter().map(|record| record.to_string()).collect(),
                    Err(_) => Vec::new(),
                };

                return Some(ResolvedCandidate {
                    domain: domain.to_string(),
                    ip_addresses,
                    nameservers,
                });
            }
            Err(e) if e.is_no_records_found() => return None,
            Err(e) => {
                if attempt == MAX_RETRIES {
                    warn!("DNS resolution gave up on {domain}: {e}");
                    return None;
                }
                debug!("DNS retry {}/{} for {domain}: {e}", attempt + 1, MAX_RETRIES);
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }

    None
}

/// Drive resolution of the whole candidate set. Hits are delivered on the
/// returned channel as they land so callers can persist and alert
/// immediately; the channel closes when the set is exhausted.
pub fn scan_candidates(
    resolver: Arc<TokioResolver>,
    candidates: Vec<String>,
) -> mpsc::Receiver<ResolvedCandidate> {
    let (tx, rx) = mpsc::channel(DNS_CONCURRENCY);

    tokio::spawn(async move {
        let total = candidates.len();
        let semaphore = Arc::new(Semaphore::new(DNS_CONCURRENCY));
        let mut handles = Vec::with_capacity(total);

        for (i, candidate) in candidates.into_iter().enumerate() {
            if i > 0 && i % 50 == 0 {
                info!("Dispatched {i}/{total} candidate resolutions");
            }

            tokio::time::sleep(RESOLVE_PACING).await;

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let resolver = resolver.clone();
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                let outcome = resolve_candidate(&resolver, &candidate).await;
                drop(permit);
                if let Some(hit) = outcome {
                    // Receiver dropping mid-scan just ends delivery.
                    let _ = tx.send(hit).await;
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    });

    rx
}
