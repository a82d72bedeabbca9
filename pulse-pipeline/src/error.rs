// Pulse Pipeline - Ingestion and query plumbing
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for Pulse Pipeline

use thiserror::Error;

/// Metric store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying I/O failed
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A row could not be encoded or decoded
    #[error("Store row format error: {0}")]
    Format(#[from] serde_json::Error),

    /// Backend refused or could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a failed `accept`.
///
/// Cloned to every caller waiting on the same record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// The write was retried and never became durable
    #[error("Persist failed after {attempts} attempts: {reason}")]
    PersistFailure { attempts: u32, reason: String },

    /// The buffer no longer accepts records
    #[error("Ingestion buffer is shutting down")]
    ShuttingDown,

    /// The record was dropped before an outcome was known
    #[error("Ingestion was cancelled before the record was written")]
    Cancelled,
}

/// Anomaly query failures.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The store could not serve the read window
    #[error("Metric store unavailable: {0}")]
    UpstreamUnavailable(#[from] StoreError),

    /// Limit must be positive
    #[error("Invalid limit: {0} (must be at least 1)")]
    InvalidLimit(usize),
}

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_failure_message() {
        let err = IngestError::PersistFailure {
            attempts: 6,
            reason: "disk full".to_string(),
        };
        assert_eq!(err.to_string(), "Persist failed after 6 attempts: disk full");
    }

    #[test]
    fn test_query_error_from_store() {
        let err: QueryError = StoreError::Unavailable("down".to_string()).into();
        assert!(matches!(err, QueryError::UpstreamUnavailable(_)));
        assert!(err.to_string().contains("down"));
    }
}
