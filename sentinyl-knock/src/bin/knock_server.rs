//! Knock server daemon.
//!
//! Listens for sealed UDP knocks and opens 60-second firewall exceptions
//! for authenticated senders. Invalid knocks are silently dropped; the
//! port is indistinguishable from a closed one.
//!
//! One-time provisioning:
//!
//! ```text
//! ipset create sentinyl_whitelist hash:ip timeout 60
//! iptables -I INPUT -m set --match-set sentinyl_whitelist src -j ACCEPT
//! iptables -A INPUT -p tcp --dport 22 -j DROP
//! ```
//!
//! Requires CAP_NET_ADMIN for ipset manipulation.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use sentinyl_core::clock::SystemClock;
use sentinyl_core::knock::{
    KnockCodec, DEFAULT_KNOCK_PORT, RATE_LIMIT_SECS, TIMESTAMP_TOLERANCE_SECS,
    WHITELIST_DURATION_SECS,
};
use sentinyl_knock::{IpsetWhitelist, KnockServer};

#[derive(Parser, Debug)]
#[command(name = "knock-server")]
#[command(about = "Sentinyl knock daemon - opens firewall access for authenticated knocks")]
struct Args {
    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_KNOCK_PORT)]
    port: u16,

    /// Address to bind (an interface address; default all)
    #[arg(short = 'i', long, default_value = "0.0.0.0")]
    interface: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let directive = if args.verbose {
        "sentinyl_knock=debug,sentinyl_core=debug"
    } else {
        "sentinyl_knock=info,sentinyl_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| directive.into()),
        )
        .init();

    let Ok(shared_secret) = std::env::var("GHOST_SECRET_KEY") else {
        eprintln!("ERROR: GHOST_SECRET_KEY environment variable not set");
        eprintln!("Run: knock-keygen, then export GHOST_SECRET_KEY=<hex key>");
        return ExitCode::from(1);
    };

    let codec = match KnockCodec::from_hex_key(&shared_secret) {
        Ok(codec) => codec,
        Err(e) => {
            error!("Configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    info!("Knock server starting");
    info!("Timestamp tolerance: +/-{TIMESTAMP_TOLERANCE_SECS} seconds");
    info!("Rate limit: 1 knock per {RATE_LIMIT_SECS} seconds");
    info!("Whitelist duration: {WHITELIST_DURATION_SECS} seconds");

    let mut server = KnockServer::new(codec, Arc::new(SystemClock), IpsetWhitelist::default());

    tokio::select! {
        result = server.listen(&args.interface, args.port) => {
            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("Fatal error: {e}");
                    ExitCode::from(3)
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            ExitCode::SUCCESS
        }
    }
}
