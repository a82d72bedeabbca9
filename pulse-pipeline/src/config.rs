// Pulse Pipeline - Ingestion and query plumbing
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for Pulse Pipeline

use crate::retry::RetryStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of records per store write.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default number of results returned by an anomaly query.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Ingestion buffer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Pending records that trigger an immediate flush
    pub max_batch_size: usize,

    /// Interval of the background flusher
    pub flush_interval: Duration,

    /// Committed keys remembered for redelivery detection
    pub dedup_capacity: usize,

    /// Store write retry policy
    pub retry: RetryStrategy,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: Duration::from_secs(1),
            dedup_capacity: 100_000,
            retry: RetryStrategy::default(),
        }
    }
}

/// Anomaly query configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Limit used when the caller gives none
    pub default_limit: usize,

    /// Larger limits are capped to this
    pub max_limit: usize,

    /// How far back a query reads; None reads the stream's whole history
    pub lookback: Option<Duration>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_QUERY_LIMIT,
            max_limit: 10_000,
            lookback: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let buffer = BufferConfig::default();
        assert_eq!(buffer.max_batch_size, 500);
        assert_eq!(buffer.flush_interval, Duration::from_secs(1));
        assert_eq!(buffer.retry.max_retries(), 5);

        let query = QueryConfig::default();
        assert_eq!(query.default_limit, 100);
        assert!(query.lookback.is_none());
    }

    #[test]
    fn test_partial_json() {
        let config: BufferConfig = serde_json::from_str(r#"{"max_batch_size": 8}"#).unwrap();
        assert_eq!(config.max_batch_size, 8);
        assert_eq!(config.dedup_capacity, 100_000);
    }
}
