// Pulse - Latency anomaly pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Metric payload decoding.
//!
//! Payloads are JSON objects:
//!
//! ```json
//! { "timestamp": 1700000000, "latency": 12.5, "cpu": 0.42, "stream": "checkout" }
//! ```
//!
//! `timestamp` and `latency` are required, `cpu` and `stream` are optional.
//! Numbers may also arrive as numeric strings, and `timestamp` may be an
//! RFC 3339 string. Unknown fields are ignored.
//!
//! Decoding is pure and total: any byte input yields either a record or a
//! [`DecodeError`], never a panic.

use crate::error::{DecodeError, Result};
use crate::record::{MetricRecord, StreamId};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Decode a payload into a record on the default stream.
pub fn decode(bytes: &[u8]) -> Result<MetricRecord> {
    decode_with_stream(bytes, &StreamId::default())
}

/// Decode a payload, using `default_stream` when the payload names none.
pub fn decode_with_stream(bytes: &[u8], default_stream: &StreamId) -> Result<MetricRecord> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DecodeError::MalformedPayload(format!("not UTF-8: {}", e)))?;

    let value: Value = serde_json::from_str(text)
        .map_err(|e| DecodeError::MalformedPayload(format!("not JSON: {}", e)))?;

    let Value::Object(fields) = value else {
        return Err(DecodeError::MalformedPayload(
            "top-level value must be an object".to_string(),
        ));
    };

    decode_fields(&fields, default_stream)
}

fn decode_fields(fields: &Map<String, Value>, default_stream: &StreamId) -> Result<MetricRecord> {
    let timestamp = match present(fields, "timestamp") {
        Some(v) => parse_timestamp(v)?,
        None => return Err(DecodeError::MissingField("timestamp")),
    };

    let latency = match present(fields, "latency") {
        Some(v) => parse_gauge("latency", v)?,
        None => return Err(DecodeError::MissingField("latency")),
    };

    let cpu = present(fields, "cpu")
        .map(|v| parse_gauge("cpu", v))
        .transpose()?;

    let stream = match present(fields, "stream") {
        Some(Value::String(s)) => StreamId::parse(s)?,
        Some(other) => {
            return Err(DecodeError::invalid(
                "stream",
                format!("expected a string, got {}", type_name(other)),
            ))
        }
        None => default_stream.clone(),
    };

    Ok(MetricRecord {
        stream,
        timestamp,
        latency,
        cpu,
    })
}

/// A field that is present and not null.
fn present<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|v| !v.is_null())
}

fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    let secs = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else {
                let f = n
                    .as_f64()
                    .ok_or_else(|| DecodeError::invalid("timestamp", "not representable"))?;
                float_secs(f)?
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                i
            } else if let Ok(f) = s.parse::<f64>() {
                float_secs(f)?
            } else {
                let parsed = DateTime::parse_from_rfc3339(s).map_err(|e| {
                    DecodeError::invalid("timestamp", format!("unrecognised format: {}", e))
                })?;
                parsed.timestamp()
            }
        }
        other => {
            return Err(DecodeError::invalid(
                "timestamp",
                format!("expected number or string, got {}", type_name(other)),
            ))
        }
    };

    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| DecodeError::invalid("timestamp", format!("{} is out of range", secs)))
}

fn float_secs(f: f64) -> Result<i64> {
    if !f.is_finite() {
        return Err(DecodeError::invalid("timestamp", "must be finite"));
    }
    let floored = f.floor();
    if floored < i64::MIN as f64 || floored >= i64::MAX as f64 {
        return Err(DecodeError::invalid("timestamp", "out of range"));
    }
    Ok(floored as i64)
}

/// Parse a finite, non-negative float.
fn parse_gauge(field: &'static str, value: &Value) -> Result<f64> {
    let v = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| DecodeError::invalid(field, "not representable as a float"))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| DecodeError::invalid(field, format!("'{}' is not a number", s)))?,
        other => {
            return Err(DecodeError::invalid(
                field,
                format!("expected number, got {}", type_name(other)),
            ))
        }
    };

    if !v.is_finite() {
        return Err(DecodeError::invalid(field, "must be finite"));
    }
    if v < 0.0 {
        return Err(DecodeError::invalid(
            field,
            format!("must be non-negative, got {}", v),
        ));
    }
    Ok(v)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
