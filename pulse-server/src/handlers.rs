// Pulse Server - HTTP boundary for the Pulse pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Request handlers.

use crate::context::AppContext;
use crate::error::ApiError;
use crate::metrics::{self, encode_metrics, update_pipeline_metrics};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use pulse::{PushEnvelope, StreamId};
use pulse_pipeline::{Ack, AnomalyQuery, BufferStats};
use pulse_scoring::AnomalyResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Push delivery: decode, buffer, and acknowledge once durably written.
pub async fn push(
    State(ctx): State<Arc<AppContext>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let result = ingest(&ctx, &body).await;
    let outcome = match &result {
        Ok(ack) => ack.status,
        Err(ApiError::Envelope(_)) => "rejected",
        Err(ApiError::IngestTimeout(_)) => "timeout",
        Err(_) => "failed",
    };
    metrics::record_push(outcome, started.elapsed());
    result.map(|ack| Json(ack.body))
}

struct PushAck {
    status: &'static str,
    body: Value,
}

async fn ingest(ctx: &AppContext, body: &[u8]) -> Result<PushAck, ApiError> {
    let envelope = PushEnvelope::from_slice(body).map_err(reject)?;
    let message_id = envelope.message_id().map(str::to_owned);
    let record = envelope
        .decode_record(&ctx.settings.default_stream)
        .map_err(reject)?;
    let stream = record.stream.clone();

    let deadline = ctx.settings.request_timeout;
    let ack = match tokio::time::timeout(deadline, ctx.buffer.accept(record)).await {
        Ok(Ok(ack)) => ack,
        Ok(Err(e)) => {
            warn!(stream = %stream, message_id = ?message_id, error = %e, "push not acknowledged");
            return Err(e.into());
        }
        Err(_) => {
            warn!(stream = %stream, message_id = ?message_id, "push deadline exceeded");
            return Err(ApiError::IngestTimeout(deadline.as_millis()));
        }
    };

    let (status, result) = match ack {
        Ack::Stored(result) => {
            if result.is_anomaly {
                metrics::record_anomaly(stream.as_str());
            }
            ("stored", Some(result))
        }
        Ack::Duplicate => {
            debug!(stream = %stream, message_id = ?message_id, "duplicate acknowledged");
            ("duplicate", None)
        }
    };
    Ok(PushAck {
        status,
        body: json!({
            "message_id": message_id,
            "stream": stream,
            "status": status,
            "result": result,
        }),
    })
}

/// Query string of `GET /get_anomalies`.
#[derive(Debug, Default, Deserialize)]
pub struct AnomalyParams {
    /// Parsed by hand so a bad value gets a JSON 400
    pub limit: Option<String>,
    pub stream: Option<String>,
    #[serde(default)]
    pub anomalies_only: Option<bool>,
}

impl AnomalyParams {
    fn into_query(self, default_stream: &StreamId) -> Result<AnomalyQuery, ApiError> {
        let stream = match self.stream.as_deref() {
            Some(name) => StreamId::parse(name).map_err(|e| ApiError::BadParameter {
                param: "stream",
                reason: e.to_string(),
            })?,
            None => default_stream.clone(),
        };
        let limit = match self.limit.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<usize>().map_err(|_| ApiError::BadParameter {
                param: "limit",
                reason: format!("expected a positive integer, got '{}'", raw),
            })?),
        };
        Ok(AnomalyQuery {
            stream,
            limit,
            anomalies_only: self.anomalies_only.unwrap_or(false),
        })
    }
}

/// Most recent scored points of one stream, newest first.
pub async fn get_anomalies(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<AnomalyParams>,
) -> Result<Json<Vec<AnomalyResult>>, ApiError> {
    let result = run_query(&ctx, params).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status(),
    };
    metrics::record_query(status.as_u16());
    result.map(Json)
}

async fn run_query(
    ctx: &AppContext,
    params: AnomalyParams,
) -> Result<Vec<AnomalyResult>, ApiError> {
    let query = params.into_query(&ctx.settings.default_stream)?;
    let deadline = ctx.settings.request_timeout;

    match tokio::time::timeout(deadline, ctx.query.recent_anomalies(&query)).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            warn!(stream = %query.stream, "anomaly query deadline exceeded");
            Err(ApiError::QueryTimeout(deadline.as_millis()))
        }
    }
}

/// Drop one stream's online baseline.
pub async fn reset_stream(
    State(ctx): State<Arc<AppContext>>,
    Path(stream): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = StreamId::parse(&stream).map_err(|e| ApiError::BadParameter {
        param: "stream",
        reason: e.to_string(),
    })?;
    if !ctx.engine.reset(&id) {
        return Err(ApiError::UnknownStream(stream));
    }
    info!(stream = %id, "baseline reset");
    Ok(Json(json!({ "stream": id, "reset": true })))
}

/// Drop every online baseline.
pub async fn reset_all_streams(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let dropped = ctx.engine.reset_all();
    info!(streams = dropped, "all baselines reset");
    Json(json!({ "reset": "all", "streams": dropped }))
}

/// Metrics handler - returns Prometheus text format.
pub async fn metrics_handler(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    update_pipeline_metrics(&ctx.buffer.stats(), ctx.buffer.unsettled(), &ctx.engine);
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        encode_metrics(),
    )
}

/// Health check handler.
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
pub async fn ready_handler(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    if ctx.is_ready() {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Shutting down")
    }
}

/// Status information response.
#[derive(Serialize)]
pub struct StatusResponse {
    version: String,
    uptime_secs: u64,
    store: String,
    model: &'static str,
    threshold: f64,
    streams: usize,
    buffer: BufferStats,
}

/// Status handler - returns JSON status information.
pub async fn status_handler(State(ctx): State<Arc<AppContext>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: ctx.started.elapsed().as_secs(),
        store: ctx.store.name().to_string(),
        model: ctx.engine.config().model.as_str(),
        threshold: ctx.engine.config().threshold,
        streams: ctx.engine.stream_count(),
        buffer: ctx.buffer.stats(),
    })
}
