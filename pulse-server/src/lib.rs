// Pulse Server - HTTP boundary for the Pulse pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Pulse Server
//!
//! HTTP boundary for the Pulse pipeline.
//!
//! ## Endpoints
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /`, `POST /push` | Push delivery; 200 acks, 400 drops, 503 redelivers |
//! | `GET /get_anomalies?limit=&stream=&anomalies_only=` | Recent scored points, newest first |
//! | `POST /streams/{stream}/reset` | Drop one online baseline |
//! | `POST /streams/reset` | Drop every online baseline |
//! | `GET /health`, `GET /ready` | Liveness and readiness |
//! | `GET /status` | Version, uptime and buffer counters (JSON) |
//! | `GET /metrics` | Prometheus text format |

pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod metrics;

pub use config::{Args, Settings, StoreBackend};
pub use context::AppContext;
pub use error::{ApiError, ServerError};

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the router over a running context.
pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", post(handlers::push))
        .route("/push", post(handlers::push))
        .route("/get_anomalies", get(handlers::get_anomalies))
        .route("/streams/reset", post(handlers::reset_all_streams))
        .route("/streams/:stream/reset", post(handlers::reset_stream))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/health", get(handlers::health_handler))
        .route("/ready", get(handlers::ready_handler))
        .route("/status", get(handlers::status_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
