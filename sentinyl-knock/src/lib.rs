//! Knock daemon plumbing.
//!
//! The validation logic lives in `sentinyl_core::knock`; this crate binds
//! it to a UDP socket and to the host firewall's whitelist set. The
//! handler surface is `on_packet(source_ip, payload)` so the whole accept
//! path is testable without raw-socket privileges.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, error, info};

use sentinyl_core::clock::Clock;
use sentinyl_core::knock::{KnockCodec, KnockValidator, WHITELIST_DURATION_SECS};

/// Capability to open a short-lived firewall exception.
#[async_trait]
pub trait Whitelist: Send + Sync {
    async fn admit(&self, ip: IpAddr, ttl_secs: u32);
}

/// ipset-backed whitelist. The set is matched by an iptables ACCEPT rule
/// installed at provisioning time:
///
/// ```text
/// ipset create sentinyl_whitelist hash:ip timeout 60
/// iptables -I INPUT -m set --match-set sentinyl_whitelist src -j ACCEPT
/// ```
#[derive(Debug, Clone)]
pub struct IpsetWhitelist {
    set_name: String,
}

impl IpsetWhitelist {
    pub fn new(set_name: impl Into<String>) -> Self {
        Self {
            set_name: set_name.into(),
        }
    }
}

impl Default for IpsetWhitelist {
    fn default() -> Self {
        Self::new("sentinyl_whitelist")
    }
}

#[async_trait]
impl Whitelist for IpsetWhitelist {
    async fn admit(&self, ip: IpAddr, ttl_secs: u32) {
        let result = tokio::process::Command::new("ipset")
            .args([
                "add",
                &self.set_name,
                &ip.to_string(),
                "timeout",
                &ttl_secs.to_string(),
                "-exist",
            ])
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => {
                info!("Whitelisted {ip} for {ttl_secs} seconds");
            }
            Ok(output) => {
                error!(
                    "Failed to whitelist {ip}: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => {
                error!("Failed to run ipset for {ip}: {e}");
            }
        }
    }
}

/// The knock daemon: one socket, one single-threaded validate loop.
pub struct KnockServer<W: Whitelist> {
    validator: KnockValidator,
    whitelist: W,
}

impl<W: Whitelist> KnockServer<W> {
    pub fn new(codec: KnockCodec, clock: Arc<dyn Clock>, whitelist: W) -> Self {
        Self {
            validator: KnockValidator::new(codec, clock),
            whitelist,
        }
    }

    /// Handle one datagram. Valid knocks whitelist the claimed address;
    /// everything else vanishes without a trace on the wire.
    pub async fn on_packet(&mut self, source_ip: IpAddr, payload: &[u8]) {
        debug!("Received packet from {source_ip} ({} bytes)", payload.len());

        if let Some(client_ip) = self.validator.validate(source_ip, payload) {
            info!("VALID KNOCK from {client_ip}");
            self.whitelist
                .admit(client_ip, WHITELIST_DURATION_SECS)
                .await;
        }
    }

    /// Bind the UDP port and serve until the task is cancelled. No
    /// response is ever written to the socket.
    pub async fn listen(&mut self, bind_addr: &str, port: u16) -> anyhow::Result<()> {
        let socket = UdpSocket::bind((bind_addr, port)).await?;
        info!("Listening on UDP port {port}");

        let mut buf = vec![0u8; 2048];
        loop {
            let (len, peer) = socket.recv_from(&mut buf).await?;
            self.on_packet(peer.ip(), &buf[..len]).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentinyl_core::clock::ManualClock;
    use sentinyl_core::knock::{generate_shared_secret, KnockPayload};
    use std::sync::Mutex;

    /// Records admissions instead of touching the host firewall.
    #[derive(Default)]
    struct RecordingWhitelist {
        admitted: Mutex<Vec<(IpAddr, u32)>>,
    }

    #[async_trait]
    impl Whitelist for RecordingWhitelist {
        async fn admit(&self, ip: IpAddr, ttl_secs: u32) {
            self.admitted.lock().unwrap().push((ip, ttl_secs));
        }
    }

    #[tokio::test]
    async fn valid_knock_admits_with_the_sixty_second_ttl() {
        let secret = generate_shared_secret();
        let codec = KnockCodec::from_hex_key(&secret).unwrap();
        let clock = ManualClock::new(Utc::now());

        let mut server = KnockServer::new(
            codec.clone(),
            Arc::new(clock.clone()),
            RecordingWhitelist::default(),
        );

        let source: IpAddr = "10.0.0.5".parse().unwrap();
        let payload = KnockPayload::new(source, clock.now());
        let packet = codec.seal(payload.format().as_bytes()).unwrap();

        server.on_packet(source, &packet).await;

        let admitted = server.whitelist.admitted.lock().unwrap().clone();
        assert_eq!(admitted, vec![(source, 60)]);
    }

    #[tokio::test]
    async fn invalid_packets_admit_nothing() {
        let secret = generate_shared_secret();
        let codec = KnockCodec::from_hex_key(&secret).unwrap();
        let clock = ManualClock::new(Utc::now());

        let mut server = KnockServer::new(
            codec,
            Arc::new(clock.clone()),
            RecordingWhitelist::default(),
        );

        let source: IpAddr = "10.0.0.5".parse().unwrap();
        server.on_packet(source, b"random noise").await;

        assert!(server.whitelist.admitted.lock().unwrap().is_empty());
    }
}
