//! # Sentinyl Server
//!
//! HTTP ingress for the Sentinyl digital-risk-protection platform.
//!
//! ## Overview
//!
//! The ingress validates requests, creates job records, and enqueues
//! payloads for the worker pool:
//!
//! - **Scan pipeline**: `/scan` and `/results/{job_id}`
//! - **Dead-man's switch**: `/guard/alert`, `/guard/response`,
//!   `/guard/status/{agent_id}`
//! - **Accounts**: `/auth/register`, `/auth/me`, `/auth/keys`
//!
//! Built on Axum with PostgreSQL for persistence and Redis as the job
//! queue.

pub mod errors;
pub mod extract;
pub mod handlers;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinyl_core::clock::{Clock, SystemClock};
use sentinyl_core::config::Settings;
use sentinyl_core::db::Database;
use sentinyl_core::queue::JobQueue;

/// Command line arguments for the Sentinyl ingress
#[derive(Parser, Debug)]
#[command(name = "sentinyl-server")]
#[command(about = "Sentinyl digital-risk-protection ingress API")]
struct Args {
    /// Server port (overrides SERVER_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides SERVER_HOST)
    #[arg(long)]
    host: Option<String>,
}

/// Server application state
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub queue: JobQueue,
    pub settings: Arc<Settings>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinyl_server=debug,sentinyl_core=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut settings = Settings::from_env()?;
    if let Some(port) = args.port {
        settings.server_port = port;
    }
    if let Some(host) = args.host {
        settings.server_host = host;
    }

    info!("Server configuration loaded");

    let db = Database::connect(&settings.database_url).await?;
    db.initialize_schema().await?;

    let queue = JobQueue::connect(&settings.redis_url).await?;
    queue.ping().await?;

    let addr: SocketAddr = format!("{}:{}", settings.server_host, settings.server_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen address: {e}"))?;

    let state = AppState {
        db,
        queue,
        settings: Arc::new(settings),
        clock: Arc::new(SystemClock),
    };

    let app = routes::create_app(state);

    info!("Starting Sentinyl ingress on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
