// Pulse - Latency anomaly pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Push delivery envelope.
//!
//! A push subscription POSTs each message wrapped in an envelope:
//!
//! ```json
//! {
//!   "message": {
//!     "data": "eyJ0aW1lc3RhbXAiOjEsImxhdGVuY3kiOjEwfQ==",
//!     "attributes": { "stream": "checkout" },
//!     "messageId": "136969346945",
//!     "publishTime": "2023-11-14T22:13:20Z"
//!   },
//!   "subscription": "projects/demo/subscriptions/metrics-push"
//! }
//! ```

use crate::codec::decode_with_stream;
use crate::error::EnvelopeError;
use crate::record::{MetricRecord, StreamId};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use std::collections::HashMap;

/// Attribute consulted when the payload carries no `stream` field.
pub const STREAM_ATTRIBUTE: &str = "stream";

/// Envelope wrapping one pushed message.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    pub message: Option<PushMessage>,
    #[serde(default)]
    pub subscription: Option<String>,
}

/// A pushed message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Base64 payload
    pub data: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub publish_time: Option<String>,
}

impl PushEnvelope {
    /// Parse an envelope from a request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(body).map_err(|e| EnvelopeError::InvalidJson(e.to_string()))
    }

    /// The pushed message, or `MissingMessage`.
    pub fn message(&self) -> Result<&PushMessage, EnvelopeError> {
        self.message.as_ref().ok_or(EnvelopeError::MissingMessage)
    }

    /// Message id, if the transport supplied one.
    pub fn message_id(&self) -> Option<&str> {
        self.message.as_ref()?.message_id.as_deref()
    }

    /// Decode the carried payload into a record.
    ///
    /// The stream falls back to the `stream` attribute, then to `default_stream`.
    pub fn decode_record(&self, default_stream: &StreamId) -> Result<MetricRecord, EnvelopeError> {
        let message = self.message()?;
        let payload = message.payload()?;

        let fallback = match message.attributes.get(STREAM_ATTRIBUTE) {
            Some(name) => StreamId::parse(name)?,
            None => default_stream.clone(),
        };

        Ok(decode_with_stream(&payload, &fallback)?)
    }
}

impl PushMessage {
    /// Base64-decoded payload bytes.
    pub fn payload(&self) -> Result<Vec<u8>, EnvelopeError> {
        let data = self.data.as_deref().ok_or(EnvelopeError::MissingData)?;
        STANDARD
            .decode(data.trim())
            .map_err(|e| EnvelopeError::InvalidBase64(e.to_string()))
    }
}
