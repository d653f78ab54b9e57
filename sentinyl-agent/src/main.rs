//! # Sentinyl Guard Agent
//!
//! Host-based behavioral anomaly detection with a dead-man's switch.
//!
//! The agent scans the host every cycle for three anomaly classes:
//!
//! - **Geo**: established connections to peers in high-risk countries
//! - **Process**: web-server processes spawning shells
//! - **Resource**: sustained CPU far above the startup baseline
//!
//! Each anomaly is reported to the control plane, which starts a
//! five-minute countdown. The agent polls for the operator verdict and
//! locally severs the suspicious peer when the verdict (or the expired
//! countdown) says so.

mod connections;
mod firewall;
mod process_tree;
mod sensors;
mod switch;

use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use firewall::IptablesFirewall;
use process_tree::SysinfoProcessTree;
use sensors::BehavioralSensor;
use switch::DeadManSwitchClient;

/// How often the control plane is polled for operator verdicts.
const STATUS_CHECK_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[command(name = "sentinyl-agent")]
#[command(about = "Sentinyl guard agent - behavioral anomaly detection with auto-block")]
struct Args {
    /// Control-plane base URL
    #[arg(long, env = "SENTINYL_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// Stable agent identifier; generated when absent
    #[arg(long, env = "SENTINYL_AGENT_ID")]
    agent_id: Option<uuid::Uuid>,

    /// Scan interval, seconds
    #[arg(long, default_value_t = 30)]
    poll_interval: u64,

    /// API key for the control plane
    #[arg(long, env = "SENTINYL_API_KEY")]
    api_key: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinyl_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let agent_id = sentinyl_model::AgentId(args.agent_id.unwrap_or_else(uuid::Uuid::new_v4));
    let hostname = hostname();

    info!("Sentinyl Guard Agent starting");
    info!("Agent ID: {agent_id}");
    info!("Hostname: {hostname}");
    info!("API: {}", args.api_url);

    let mut sensor = BehavioralSensor::new(SysinfoProcessTree::new()).await;
    let mut switch = DeadManSwitchClient::new(
        args.api_url.clone(),
        args.api_key.clone(),
        agent_id,
        hostname,
    );
    let firewall = IptablesFirewall;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut scan_tick = tokio::time::interval(Duration::from_secs(args.poll_interval));
    let mut status_tick = tokio::time::interval(STATUS_CHECK_INTERVAL);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Agent shutdown requested");
                break;
            }
            _ = scan_tick.tick() => {
                for anomaly in sensor.scan().await {
                    if let Err(e) = switch.send_alert(&anomaly).await {
                        error!("Error sending alert: {e}");
                    }
                }
            }
            _ = status_tick.tick() => {
                if let Err(e) = switch.check_for_override(&firewall).await {
                    error!("Error checking for override: {e}");
                }
                switch.collect_expired();
            }
        }
    }

    Ok(())
}

fn hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}
