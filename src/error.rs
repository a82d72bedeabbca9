//! Error types for Pulse
//!
//! This module defines the errors produced while turning inbound bytes into
//! [`MetricRecord`](crate::MetricRecord)s. All of them are client-side and
//! non-retryable: the offending input is rejected, nothing else is affected.

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Errors while decoding a metric payload
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload is not a UTF-8 JSON object
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Required field absent (or null)
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Field present but outside its domain
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl DecodeError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Short label for counters and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedPayload(_) => "malformed_payload",
            Self::MissingField(_) => "missing_field",
            Self::InvalidValue { .. } => "invalid_value",
        }
    }
}

/// Errors while unwrapping a push delivery envelope
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvelopeError {
    /// Body is not a JSON envelope
    #[error("Invalid envelope JSON: {0}")]
    InvalidJson(String),

    /// No `message` key
    #[error("No push message found in envelope")]
    MissingMessage,

    /// Message carries no `data`
    #[error("Push message has no data")]
    MissingData,

    /// `data` is not valid base64
    #[error("Invalid base64 data: {0}")]
    InvalidBase64(String),

    /// Decoded data is not a valid metric payload
    #[error(transparent)]
    Payload(#[from] DecodeError),
}

impl EnvelopeError {
    /// Short label for counters and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_envelope",
            Self::MissingMessage => "missing_message",
            Self::MissingData => "missing_data",
            Self::InvalidBase64(_) => "invalid_base64",
            Self::Payload(e) => e.kind(),
        }
    }
}
