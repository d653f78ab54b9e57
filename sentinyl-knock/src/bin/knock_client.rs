//! Knock client.
//!
//! Sends one sealed UDP datagram to open the server's firewall for this
//! host. Fire-and-forget: no response ever comes back.

use std::net::IpAddr;
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use tokio::net::UdpSocket;

use sentinyl_core::knock::{KnockCodec, KnockPayload, DEFAULT_KNOCK_PORT};

#[derive(Parser, Debug)]
#[command(name = "knock-client")]
#[command(about = "Send a sealed knock to open server firewall access")]
struct Args {
    /// Target server address
    #[arg(short, long)]
    server: String,

    /// Target UDP port
    #[arg(short, long, default_value_t = DEFAULT_KNOCK_PORT)]
    port: u16,

    /// Client IP to whitelist (auto-detected when omitted)
    #[arg(short = 'i', long = "ip")]
    client_ip: Option<IpAddr>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let Ok(shared_secret) = std::env::var("GHOST_SECRET_KEY") else {
        eprintln!("ERROR: GHOST_SECRET_KEY environment variable not set");
        return ExitCode::from(1);
    };

    let codec = match KnockCodec::from_hex_key(&shared_secret) {
        Ok(codec) => codec,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return ExitCode::from(1);
        }
    };

    let client_ip = match args.client_ip {
        Some(ip) => ip,
        None => match detect_local_ip().await {
            Some(ip) => ip,
            None => {
                eprintln!("ERROR: could not auto-detect local IP; pass --ip");
                return ExitCode::from(1);
            }
        },
    };

    if args.verbose {
        println!("[*] Target: {}:{}", args.server, args.port);
        println!("[*] Client IP: {client_ip}");
    }

    let payload = KnockPayload::new(client_ip, Utc::now());
    let packet = match codec.seal(payload.format().as_bytes()) {
        Ok(packet) => packet,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return ExitCode::from(3);
        }
    };

    match send_knock(&args.server, args.port, &packet).await {
        Ok(()) => {
            if args.verbose {
                println!("[+] Knock sent - firewall should open for 60 seconds");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("ERROR: failed to send knock: {e}");
            ExitCode::from(2)
        }
    }
}

async fn send_knock(server: &str, port: u16, packet: &[u8]) -> anyhow::Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.send_to(packet, (server, port)).await?;
    Ok(())
}

/// Outbound-route trick: connect a throwaway UDP socket and read the
/// chosen local address. Nothing is transmitted.
async fn detect_local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect("8.8.8.8:80").await.ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}
