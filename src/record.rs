// Pulse - Latency anomaly pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Canonical metric record, stream identity and dedup keys.

use crate::error::DecodeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use xxhash_rust::xxh64::Xxh64;

/// Stream used when neither the payload nor the delivery names one.
pub const DEFAULT_STREAM: &str = "default";

/// Maximum stream identifier length in bytes.
pub const MAX_STREAM_LEN: usize = 128;

/// Identity grouping metric points for baseline purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Validate and wrap a stream name.
    pub fn parse(name: &str) -> Result<Self, DecodeError> {
        if name.is_empty() {
            return Err(DecodeError::invalid("stream", "must not be empty"));
        }
        if name.len() > MAX_STREAM_LEN {
            return Err(DecodeError::invalid(
                "stream",
                format!("longer than {} bytes", MAX_STREAM_LEN),
            ));
        }
        if name.chars().any(char::is_control) {
            return Err(DecodeError::invalid(
                "stream",
                "contains control characters",
            ));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self(DEFAULT_STREAM.to_string())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StreamId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deterministic identifier used to discard redeliveries.
///
/// Two records with the same stream and the same second share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey(pub u64);

impl DedupKey {
    pub fn of(stream: &StreamId, timestamp: &DateTime<Utc>) -> Self {
        let mut hasher = Xxh64::new(0);
        hasher.update(stream.as_str().as_bytes());
        // 0xFF never occurs in UTF-8, so stream/timestamp boundaries cannot alias
        hasher.update(&[0xFF]);
        hasher.update(&timestamp.timestamp().to_le_bytes());
        Self(hasher.digest())
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One latency/CPU observation.
///
/// Immutable once stored. Serialized with the timestamp as epoch seconds,
/// which is also the store's on-disk row format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Stream the point belongs to
    pub stream: StreamId,
    /// Observation time, second resolution
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Latency, finite and non-negative
    pub latency: f64,
    /// Optional CPU gauge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
}

impl MetricRecord {
    /// Create a record without a CPU reading.
    pub fn new(stream: StreamId, timestamp: DateTime<Utc>, latency: f64) -> Self {
        Self {
            stream,
            timestamp,
            latency,
            cpu: None,
        }
    }

    /// Create a record from epoch seconds. Returns None if out of range.
    pub fn at_epoch(stream: StreamId, secs: i64, latency: f64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(|ts| Self::new(stream, ts, latency))
    }

    pub fn with_cpu(mut self, cpu: f64) -> Self {
        self.cpu = Some(cpu);
        self
    }

    /// Dedup key of this record.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::of(&self.stream, &self.timestamp)
    }

    /// Epoch seconds of the observation.
    pub fn epoch_secs(&self) -> i64 {
        self.timestamp.timestamp()
    }
}
