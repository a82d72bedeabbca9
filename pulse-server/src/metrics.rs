// Pulse Server - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for Pulse.
//!
//! Request-path events are counted directly by the handlers. Buffer and
//! engine totals are copied into gauges on every scrape by
//! [`update_pipeline_metrics`].

use lazy_static::lazy_static;
use parking_lot::Mutex;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};
use pulse_pipeline::BufferStats;
use pulse_scoring::ScoringEngine;
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

/// Distinct `stream` label values before anomalies are counted under `other`.
pub const MAX_STREAM_LABELS: usize = 64;

/// Label used once [`MAX_STREAM_LABELS`] streams have been seen.
pub const OVERFLOW_STREAM_LABEL: &str = "other";

lazy_static! {
    // ============================================================
    // Request path
    // ============================================================

    /// Pushed records by outcome (stored, duplicate, rejected, failed, timeout).
    pub static ref RECORDS_RECEIVED: IntCounterVec = register_int_counter_vec!(
        "pulse_records_received_total",
        "Pushed records by outcome",
        &["outcome"]
    ).unwrap();

    /// Push handling latency by outcome, decode through acknowledgment.
    pub static ref PUSH_DURATION: HistogramVec = register_histogram_vec!(
        "pulse_push_duration_seconds",
        "Push handling latency in seconds",
        &["outcome"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Rejected deliveries by error kind.
    pub static ref DECODE_REJECTIONS: IntCounterVec = register_int_counter_vec!(
        "pulse_decode_rejections_total",
        "Rejected envelopes and payloads by error kind",
        &["kind"]
    ).unwrap();

    /// Stored acknowledgments flagged by online scoring.
    pub static ref ANOMALIES_DETECTED: IntCounterVec = register_int_counter_vec!(
        "pulse_anomalies_detected_total",
        "Acknowledged pushes flagged as anomalous",
        &["stream"]
    ).unwrap();

    /// Anomaly queries by response status class.
    pub static ref QUERY_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "pulse_query_requests_total",
        "Anomaly queries by status",
        &["status"]
    ).unwrap();

    // ============================================================
    // Pipeline state (refreshed on scrape)
    // ============================================================

    pub static ref STORE_WRITE_ATTEMPTS: IntGauge = register_int_gauge!(
        "pulse_store_write_attempts",
        "Store write calls including retries"
    ).unwrap();

    pub static ref BATCHES_WRITTEN: IntGauge = register_int_gauge!(
        "pulse_batches_written",
        "Batches durably written"
    ).unwrap();

    pub static ref BATCHES_FAILED: IntGauge = register_int_gauge!(
        "pulse_batches_failed",
        "Batches that exhausted their retries"
    ).unwrap();

    pub static ref ROWS_WRITTEN: IntGauge = register_int_gauge!(
        "pulse_rows_written",
        "Rows durably written"
    ).unwrap();

    pub static ref PENDING_RECORDS: IntGauge = register_int_gauge!(
        "pulse_pending_records",
        "Records pending or being written"
    ).unwrap();

    pub static ref TRACKED_STREAMS: IntGauge = register_int_gauge!(
        "pulse_tracked_streams",
        "Streams with an online baseline"
    ).unwrap();

    pub static ref POINTS_SCORED: IntGauge = register_int_gauge!(
        "pulse_points_scored",
        "Points scored online since start"
    ).unwrap();

    static ref STREAM_LABELS: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

/// Record the outcome of one push and how long it took.
pub fn record_push(outcome: &str, elapsed: Duration) {
    RECORDS_RECEIVED.with_label_values(&[outcome]).inc();
    PUSH_DURATION
        .with_label_values(&[outcome])
        .observe(elapsed.as_secs_f64());
}

/// Record why a delivery was rejected.
pub fn record_rejection(kind: &str) {
    DECODE_REJECTIONS.with_label_values(&[kind]).inc();
}

pub fn record_anomaly(stream: &str) {
    ANOMALIES_DETECTED
        .with_label_values(&[stream_label(stream).as_str()])
        .inc();
}

/// Label value for `stream`, keeping the label set bounded.
///
/// The first [`MAX_STREAM_LABELS`] streams keep their own name for the life
/// of the process; later ones share [`OVERFLOW_STREAM_LABEL`].
pub fn stream_label(stream: &str) -> String {
    let mut seen = STREAM_LABELS.lock();
    if seen.contains(stream) {
        return stream.to_string();
    }
    if seen.len() < MAX_STREAM_LABELS {
        seen.insert(stream.to_string());
        return stream.to_string();
    }
    OVERFLOW_STREAM_LABEL.to_string()
}

pub fn record_query(status: u16) {
    QUERY_REQUESTS
        .with_label_values(&[status.to_string().as_str()])
        .inc();
}

/// Copy buffer and engine totals into the gauges.
pub fn update_pipeline_metrics(stats: &BufferStats, unsettled: usize, engine: &ScoringEngine) {
    STORE_WRITE_ATTEMPTS.set(clamp(stats.write_attempts));
    BATCHES_WRITTEN.set(clamp(stats.batches));
    BATCHES_FAILED.set(clamp(stats.batches_failed));
    ROWS_WRITTEN.set(clamp(stats.rows_written));
    PENDING_RECORDS.set(clamp(unsettled as u64));
    TRACKED_STREAMS.set(clamp(engine.stream_count() as u64));
    POINTS_SCORED.set(clamp(engine.scored_total()));
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Encode all registered metrics in Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
