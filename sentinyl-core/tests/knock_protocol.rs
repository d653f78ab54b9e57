//! Knock protocol scenarios: the full accept path, the rate limit, and
//! the anti-replay window, driven with a pinned clock.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{Duration, Utc};

use sentinyl_core::clock::{Clock, ManualClock};
use sentinyl_core::knock::{generate_shared_secret, KnockCodec, KnockPayload, KnockValidator};

fn setup() -> (KnockCodec, ManualClock, KnockValidator) {
    let codec = KnockCodec::from_hex_key(&generate_shared_secret()).unwrap();
    let clock = ManualClock::new(Utc::now());
    let validator = KnockValidator::new(codec.clone(), Arc::new(clock.clone()));
    (codec, clock, validator)
}

fn knock(codec: &KnockCodec, ip: &str, clock: &ManualClock) -> Vec<u8> {
    let payload = KnockPayload::new(ip.parse().unwrap(), clock.now());
    codec.seal(payload.format().as_bytes()).unwrap()
}

#[test]
fn valid_knock_then_rate_limited_repeat() {
    let (codec, clock, mut validator) = setup();
    let client: IpAddr = "10.0.0.5".parse().unwrap();

    // First knock opens the door.
    let packet = knock(&codec, "10.0.0.5", &clock);
    assert_eq!(validator.validate(client, &packet), Some(client));

    // A second knock three seconds later produces no whitelist update.
    clock.advance(Duration::seconds(3));
    let packet = knock(&codec, "10.0.0.5", &clock);
    assert_eq!(validator.validate(client, &packet), None);
    assert_eq!(validator.drops().rate_limited, 1);
}

#[test]
fn replay_after_eleven_seconds_is_dropped() {
    let (codec, clock, mut validator) = setup();
    let client: IpAddr = "10.0.0.5".parse().unwrap();

    let packet = knock(&codec, "10.0.0.5", &clock);
    assert_eq!(validator.validate(client, &packet), Some(client));

    // Same bytes, same source, 11 seconds later: the embedded timestamp
    // falls outside the +/-10s window.
    clock.advance(Duration::seconds(11));
    assert_eq!(validator.validate(client, &packet), None);
    assert_eq!(validator.drops().stale, 1);
}

#[test]
fn sealed_round_trip_is_stable_for_any_key() {
    for _ in 0..8 {
        let codec = KnockCodec::from_hex_key(&generate_shared_secret()).unwrap();
        let plaintext = b"1700000000:deadbeef:10.0.0.5";
        let packet = codec.seal(plaintext).unwrap();
        assert_eq!(codec.open(&packet).as_deref(), Some(plaintext.as_slice()));
    }
}

#[test]
fn independent_sources_keep_independent_rate_limits() {
    let (codec, clock, mut validator) = setup();
    let alice: IpAddr = "10.0.0.5".parse().unwrap();
    let bob: IpAddr = "10.0.0.6".parse().unwrap();

    let packet = knock(&codec, "10.0.0.5", &clock);
    assert_eq!(validator.validate(alice, &packet), Some(alice));

    // Bob knocking right after Alice is not rate limited.
    let packet = knock(&codec, "10.0.0.6", &clock);
    assert_eq!(validator.validate(bob, &packet), Some(bob));
}
