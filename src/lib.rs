//! # Pulse - latency anomaly pipeline
//!
//! Record types and the inbound codec shared by every Pulse crate.
//!
//! ## Key Features
//!
//! - **Typed decode**: raw bytes become a [`MetricRecord`] or a typed [`DecodeError`]
//! - **Push envelopes**: base64 payloads wrapped by a push subscription
//! - **Dedup keys**: deterministic per-record identity for idempotent writes
//!
//! ## Quick Start
//!
//! ```rust
//! use pulse::{decode, DecodeError};
//!
//! let record = decode(br#"{"timestamp": 1700000000, "latency": 12.5, "cpu": 0.3}"#).unwrap();
//! assert_eq!(record.latency, 12.5);
//! assert_eq!(record.stream.as_str(), "default");
//!
//! let err = decode(br#"{"timestamp": 1700000000}"#).unwrap_err();
//! assert_eq!(err, DecodeError::MissingField("latency"));
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: Payload validation and decoding
//! - [`envelope`]: Push delivery envelope
//! - [`record`]: Records, stream identity and dedup keys
//! - [`error`]: Codec errors

// Modules
pub mod codec;
pub mod envelope;
pub mod error;
pub mod record;

// Re-exports for convenient access
pub use codec::{decode, decode_with_stream};
pub use envelope::{PushEnvelope, PushMessage};
pub use error::{DecodeError, EnvelopeError, Result};
pub use record::{DedupKey, MetricRecord, StreamId, DEFAULT_STREAM};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_decode_reexport() {
        let record = decode(br#"{"timestamp": 60, "latency": 0}"#).unwrap();
        assert_eq!(record.epoch_secs(), 60);
        assert_eq!(record.latency, 0.0);
    }
}
