// Pulse - Codec Integration Tests
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Property-style tests for the metric payload codec and push envelopes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use pulse::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ============================================================================
// Helper Functions
// ============================================================================

fn payload(timestamp: i64, latency: f64, cpu: Option<f64>) -> String {
    match cpu {
        Some(cpu) => format!(
            r#"{{"timestamp": {}, "latency": {:?}, "cpu": {:?}}}"#,
            timestamp, latency, cpu
        ),
        None => format!(r#"{{"timestamp": {}, "latency": {:?}}}"#, timestamp, latency),
    }
}

fn push_body(data: &str) -> Vec<u8> {
    format!(
        r#"{{"message": {{"data": "{}", "messageId": "1"}}, "subscription": "s"}}"#,
        STANDARD.encode(data)
    )
    .into_bytes()
}

// ============================================================================
// Field fidelity
// ============================================================================

#[test]
fn test_valid_payloads_round_trip_exactly() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..500 {
        let timestamp = rng.gen_range(0..4_000_000_000i64);
        let latency = rng.gen_range(0.0..10_000.0f64);
        let cpu = if rng.gen_bool(0.5) {
            Some(rng.gen_range(0.0..1.0f64))
        } else {
            None
        };

        let record = decode(payload(timestamp, latency, cpu).as_bytes()).unwrap();
        assert_eq!(record.epoch_secs(), timestamp);
        assert_eq!(record.latency, latency);
        assert_eq!(record.cpu, cpu);
        assert_eq!(record.stream.as_str(), DEFAULT_STREAM);
    }
}

#[test]
fn test_missing_required_fields() {
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..100 {
        let timestamp = rng.gen_range(0..4_000_000_000i64);
        let latency = rng.gen_range(0.0..10_000.0f64);

        let no_latency = format!(r#"{{"timestamp": {}, "cpu": 0.5}}"#, timestamp);
        assert_eq!(
            decode(no_latency.as_bytes()),
            Err(DecodeError::MissingField("latency"))
        );

        let no_timestamp = format!(r#"{{"latency": {:?}, "cpu": 0.5}}"#, latency);
        assert_eq!(
            decode(no_timestamp.as_bytes()),
            Err(DecodeError::MissingField("timestamp"))
        );
    }
}

#[test]
fn test_negative_latency_rejected() {
    let mut rng = StdRng::seed_from_u64(13);

    for _ in 0..100 {
        let latency = -rng.gen_range(f64::MIN_POSITIVE..1e9);
        let err = decode(payload(1, latency, None).as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidValue {
                field: "latency",
                ..
            }
        ));
    }
}

#[test]
fn test_zero_latency_accepted() {
    let record = decode(payload(1, 0.0, None).as_bytes()).unwrap();
    assert_eq!(record.latency, 0.0);
}

// ============================================================================
// Totality
// ============================================================================

#[test]
fn test_arbitrary_bytes_never_panic() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..2_000 {
        let len = rng.gen_range(0..64);
        let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        // Either outcome is fine, a panic is not
        let _ = decode(&bytes);
    }
}

#[test]
fn test_mutated_payloads_never_panic() {
    let mut rng = StdRng::seed_from_u64(99);
    let base = br#"{"timestamp": 1700000000, "latency": 12.5, "cpu": 0.3, "stream": "x"}"#;

    for _ in 0..2_000 {
        let mut bytes = base.to_vec();
        for _ in 0..rng.gen_range(1..4) {
            let idx = rng.gen_range(0..bytes.len());
            bytes[idx] = rng.gen();
        }
        let _ = decode(&bytes);
    }
}

// ============================================================================
// Envelopes
// ============================================================================

#[test]
fn test_envelope_round_trip() {
    let body = push_body(&payload(1_700_000_000, 10.0, Some(0.2)));
    let envelope = PushEnvelope::from_slice(&body).unwrap();
    let record = envelope.decode_record(&StreamId::default()).unwrap();

    assert_eq!(record.epoch_secs(), 1_700_000_000);
    assert_eq!(record.latency, 10.0);
    assert_eq!(record.cpu, Some(0.2));
}

#[test]
fn test_envelope_without_message_is_rejected() {
    let envelope = PushEnvelope::from_slice(br#"{"data": "e30="}"#).unwrap();
    let err = envelope.decode_record(&StreamId::default()).unwrap_err();
    assert_eq!(err, EnvelopeError::MissingMessage);
    assert_eq!(err.kind(), "missing_message");
}

#[test]
fn test_envelope_payload_errors_keep_their_kind() {
    let body = push_body(&payload(1, -3.0, None));
    let envelope = PushEnvelope::from_slice(&body).unwrap();
    let err = envelope.decode_record(&StreamId::default()).unwrap_err();
    assert_eq!(err.kind(), "invalid_value");
}
