//! Single-packet-authorization knock protocol.
//!
//! A knock is one UDP datagram sealed with XChaCha20-Poly1305 under a
//! 32-byte pre-shared key. The 24-byte nonce is prepended to the
//! ciphertext. Plaintext format:
//!
//! ```text
//! <unix_ts>:<hex_nonce>:<claimed_ip>
//! ```
//!
//! Every rejection is a silent drop: an invalid knock must be
//! indistinguishable from no service at all. Drops are only counted
//! internally.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use chrono::{DateTime, Utc};
use rand::RngCore;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{Result, SentinylError};

/// Anti-replay window, seconds either side of now.
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 10;

/// Minimum spacing between accepted knocks from one source.
pub const RATE_LIMIT_SECS: i64 = 5;

/// How long an accepted source stays whitelisted.
pub const WHITELIST_DURATION_SECS: u32 = 60;

/// Default knock port.
pub const DEFAULT_KNOCK_PORT: u16 = 62201;

const NONCE_LEN: usize = 24;

/// Seals and opens knock payloads under the shared key.
#[derive(Clone)]
pub struct KnockCodec {
    cipher: XChaCha20Poly1305,
}

impl std::fmt::Debug for KnockCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnockCodec").finish_non_exhaustive()
    }
}

impl KnockCodec {
    /// Build from the hex-encoded 32-byte shared secret.
    pub fn from_hex_key(shared_secret_hex: &str) -> Result<Self> {
        let key = hex::decode(shared_secret_hex.trim())
            .map_err(|_| SentinylError::Validation("shared secret is not valid hex".to_string()))?;

        if key.len() != 32 {
            return Err(SentinylError::Validation(
                "shared secret must be exactly 32 bytes".to_string(),
            ));
        }

        let cipher = XChaCha20Poly1305::new_from_slice(&key)
            .map_err(|_| SentinylError::Internal("cipher construction failed".to_string()))?;

        Ok(Self { cipher })
    }

    /// Seal a plaintext; output is `nonce || ciphertext`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| SentinylError::Internal("knock encryption failed".to_string()))?;

        let mut packet = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        packet.extend_from_slice(&nonce);
        packet.extend_from_slice(&ciphertext);
        Ok(packet)
    }

    /// Open a sealed packet. `None` covers every failure mode: short
    /// packets, wrong key, or any tampered bit.
    pub fn open(&self, packet: &[u8]) -> Option<Vec<u8>> {
        if packet.len() <= NONCE_LEN {
            return None;
        }
        let (nonce, ciphertext) = packet.split_at(NONCE_LEN);
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .ok()
    }
}

/// Generate a fresh hex-encoded 32-byte shared secret.
pub fn generate_shared_secret() -> String {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    hex::encode(key)
}

/// Decrypted knock payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnockPayload {
    pub timestamp: i64,
    pub nonce_hex: String,
    pub claimed_ip: IpAddr,
}

impl KnockPayload {
    pub fn format(&self) -> String {
        format!("{}:{}:{}", self.timestamp, self.nonce_hex, self.claimed_ip)
    }

    pub fn parse(plaintext: &str) -> Option<Self> {
        let mut parts = plaintext.splitn(3, ':');
        let timestamp = parts.next()?.parse().ok()?;
        let nonce_hex = parts.next()?.to_string();
        let claimed_ip = parts.next()?.parse().ok()?;
        Some(Self {
            timestamp,
            nonce_hex,
            claimed_ip,
        })
    }

    /// Fresh payload claiming `client_ip`, stamped at `now`.
    pub fn new(client_ip: IpAddr, now: DateTime<Utc>) -> Self {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self {
            timestamp: now.timestamp(),
            nonce_hex: hex::encode(nonce),
            claimed_ip: client_ip,
        }
    }
}

/// Internal drop accounting. Never surfaced to the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounters {
    pub undecryptable: u64,
    pub malformed: u64,
    pub stale: u64,
    pub spoofed: u64,
    pub rate_limited: u64,
}

/// Validates decrypted knocks: anti-replay window, source/claim match,
/// and the per-source rate limit. Single-threaded within the sniffing
/// process; the knock-time map is process-local state.
pub struct KnockValidator {
    codec: KnockCodec,
    clock: Arc<dyn Clock>,
    last_knock: HashMap<IpAddr, DateTime<Utc>>,
    drops: DropCounters,
}

impl std::fmt::Debug for KnockValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnockValidator")
            .field("tracked_sources", &self.last_knock.len())
            .field("drops", &self.drops)
            .finish()
    }
}

impl KnockValidator {
    pub fn new(codec: KnockCodec, clock: Arc<dyn Clock>) -> Self {
        Self {
            codec,
            clock,
            last_knock: HashMap::new(),
            drops: DropCounters::default(),
        }
    }

    pub fn drops(&self) -> DropCounters {
        self.drops
    }

    /// Validate one packet. `Some(ip)` means the source earned a
    /// whitelist entry; `None` is a silent drop.
    pub fn validate(&mut self, source_ip: IpAddr, packet: &[u8]) -> Option<IpAddr> {
        let now = self.clock.now();

        let Some(plaintext) = self.codec.open(packet) else {
            // Wrong key or corrupted packet. Not even logged, to keep the
            // log quiet under scanning noise.
            self.drops.undecryptable += 1;
            return None;
        };

        let Some(payload) = String::from_utf8(plaintext)
            .ok()
            .as_deref()
            .and_then(KnockPayload::parse)
        else {
            self.drops.malformed += 1;
            debug!("Malformed knock payload from {source_ip}");
            return None;
        };

        let delta = (now.timestamp() - payload.timestamp).abs();
        if delta > TIMESTAMP_TOLERANCE_SECS {
            self.drops.stale += 1;
            debug!("Knock timestamp out of range from {source_ip}: delta={delta}s");
            return None;
        }

        if source_ip != payload.claimed_ip {
            self.drops.spoofed += 1;
            warn!(
                "Knock IP mismatch from {source_ip}: claimed={}",
                payload.claimed_ip
            );
            return None;
        }

        if let Some(last) = self.last_knock.get(&source_ip) {
            if (now - *last).num_seconds() < RATE_LIMIT_SECS {
                self.drops.rate_limited += 1;
                debug!("Knock rate limit exceeded for {source_ip}");
                return None;
            }
        }

        self.last_knock.insert(source_ip, now);
        Some(payload.claimed_ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    const KEY: &str = "8f3c0a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7";

    fn codec() -> KnockCodec {
        KnockCodec::from_hex_key(KEY).unwrap()
    }

    fn sealed_knock(codec: &KnockCodec, ip: &str, now: DateTime<Utc>) -> Vec<u8> {
        let payload = KnockPayload::new(ip.parse().unwrap(), now);
        codec.seal(payload.format().as_bytes()).unwrap()
    }

    #[test]
    fn key_validation_rejects_bad_secrets() {
        assert!(KnockCodec::from_hex_key("not hex").is_err());
        assert!(KnockCodec::from_hex_key("abcd").is_err());
        assert!(KnockCodec::from_hex_key(KEY).is_ok());
    }

    #[test]
    fn seal_open_round_trips() {
        let codec = codec();
        let payload = b"1700000000:00ff:10.0.0.5";
        let packet = codec.seal(payload).unwrap();
        assert_eq!(codec.open(&packet).unwrap(), payload);
    }

    #[test]
    fn any_single_bit_flip_fails_to_open() {
        let codec = codec();
        let packet = codec.seal(b"1700000000:00ff:10.0.0.5").unwrap();

        for byte in 0..packet.len() {
            let mut tampered = packet.clone();
            tampered[byte] ^= 0x01;
            assert!(codec.open(&tampered).is_none(), "byte {byte}");
        }
    }

    #[test]
    fn two_keys_cannot_read_each_other() {
        let other = KnockCodec::from_hex_key(&generate_shared_secret()).unwrap();
        let packet = codec().seal(b"1700000000:00ff:10.0.0.5").unwrap();
        assert!(other.open(&packet).is_none());
    }

    #[test]
    fn payload_format_round_trips() {
        let payload = KnockPayload {
            timestamp: 1_700_000_000,
            nonce_hex: "a1b2c3".to_string(),
            claimed_ip: "10.0.0.5".parse().unwrap(),
        };
        assert_eq!(KnockPayload::parse(&payload.format()).unwrap(), payload);
        assert!(KnockPayload::parse("no-colons-here").is_none());
        assert!(KnockPayload::parse("abc:def:10.0.0.5").is_none());
        assert!(KnockPayload::parse("1700000000:ff:not-an-ip").is_none());
    }

    #[test]
    fn valid_knock_is_accepted_once_per_window() {
        let clock = ManualClock::new(Utc::now());
        let mut validator = KnockValidator::new(codec(), Arc::new(clock.clone()));
        let source: IpAddr = "10.0.0.5".parse().unwrap();

        let packet = sealed_knock(&codec(), "10.0.0.5", clock.now());
        assert_eq!(validator.validate(source, &packet), Some(source));

        // 3 seconds later: rate limited, no whitelist update.
        clock.advance(Duration::seconds(3));
        let packet = sealed_knock(&codec(), "10.0.0.5", clock.now());
        assert_eq!(validator.validate(source, &packet), None);
        assert_eq!(validator.drops().rate_limited, 1);

        // Past the window: accepted again.
        clock.advance(Duration::seconds(3));
        let packet = sealed_knock(&codec(), "10.0.0.5", clock.now());
        assert_eq!(validator.validate(source, &packet), Some(source));
    }

    #[test]
    fn replayed_packet_outside_the_window_is_dropped() {
        let clock = ManualClock::new(Utc::now());
        let mut validator = KnockValidator::new(codec(), Arc::new(clock.clone()));
        let source: IpAddr = "10.0.0.5".parse().unwrap();

        let packet = sealed_knock(&codec(), "10.0.0.5", clock.now());
        assert_eq!(validator.validate(source, &packet), Some(source));

        // The exact same bytes 11 seconds later: timestamp out of range.
        clock.advance(Duration::seconds(11));
        assert_eq!(validator.validate(source, &packet), None);
        assert_eq!(validator.drops().stale, 1);
    }

    #[test]
    fn spoofed_source_is_dropped() {
        let clock = ManualClock::new(Utc::now());
        let mut validator = KnockValidator::new(codec(), Arc::new(clock.clone()));

        let packet = sealed_knock(&codec(), "10.0.0.5", clock.now());
        let spoofer: IpAddr = "192.0.2.77".parse().unwrap();
        assert_eq!(validator.validate(spoofer, &packet), None);
        assert_eq!(validator.drops().spoofed, 1);
    }

    #[test]
    fn garbage_and_foreign_ciphertext_are_silent() {
        let clock = ManualClock::new(Utc::now());
        let mut validator = KnockValidator::new(codec(), Arc::new(clock.clone()));
        let source: IpAddr = "10.0.0.5".parse().unwrap();

        assert_eq!(validator.validate(source, b"hello"), None);
        assert_eq!(validator.validate(source, &[0u8; 64]), None);
        assert_eq!(validator.drops().undecryptable, 2);
    }

    #[test]
    fn sealed_garbage_plaintext_is_malformed() {
        let clock = ManualClock::new(Utc::now());
        let codec = codec();
        let mut validator = KnockValidator::new(codec.clone(), Arc::new(clock.clone()));
        let source: IpAddr = "10.0.0.5".parse().unwrap();

        let packet = codec.seal(b"not a knock at all").unwrap();
        assert_eq!(validator.validate(source, &packet), None);
        assert_eq!(validator.drops().malformed, 1);
    }
}
