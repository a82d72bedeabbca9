// Pulse Server - HTTP boundary for the Pulse pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Server errors.
//!
//! [`ServerError`] stops the process at start-up. [`ApiError`] is returned by
//! handlers and becomes a status code plus a small JSON body. For the push
//! route the status is the acknowledgment: 2xx acks, 4xx drops a poison
//! message, 5xx asks the bus to redeliver.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pulse::EnvelopeError;
use pulse_pipeline::{IngestError, QueryError, StoreError};
use pulse_scoring::{CheckpointError, ConfigError};
use serde_json::json;
use thiserror::Error;

/// Start-up failures.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid scoring configuration: {0}")]
    Scoring(#[from] ConfigError),

    #[error("Metric store error: {0}")]
    Store(#[from] StoreError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request failures.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Envelope or payload rejected
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Invalid query parameter '{param}': {reason}")]
    BadParameter { param: &'static str, reason: String },

    #[error("Unknown stream: {0}")]
    UnknownStream(String),

    #[error("Ingestion did not complete within {0} ms")]
    IngestTimeout(u128),

    #[error("Query did not complete within {0} ms")]
    QueryTimeout(u128),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Envelope(_) | Self::BadParameter { .. } => StatusCode::BAD_REQUEST,
            Self::Ingest(_) | Self::IngestTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Query(QueryError::InvalidLimit(_)) => StatusCode::BAD_REQUEST,
            Self::Query(QueryError::UpstreamUnavailable(_)) | Self::QueryTimeout(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::UnknownStream(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Stable label for the JSON body and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Envelope(e) => e.kind(),
            Self::Ingest(IngestError::PersistFailure { .. }) => "persist_failure",
            Self::Ingest(IngestError::ShuttingDown) => "shutting_down",
            Self::Ingest(IngestError::Cancelled) => "cancelled",
            Self::Query(QueryError::InvalidLimit(_)) => "invalid_limit",
            Self::Query(QueryError::UpstreamUnavailable(_)) => "upstream_unavailable",
            Self::BadParameter { .. } => "bad_parameter",
            Self::UnknownStream(_) => "unknown_stream",
            Self::IngestTimeout(_) | Self::QueryTimeout(_) => "deadline_exceeded",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}
