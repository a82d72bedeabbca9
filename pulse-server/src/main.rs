// Pulse Server - HTTP boundary for the Pulse pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Pulse Server
//!
//! Receives push deliveries of latency metrics and serves anomaly queries.
//!
//! ## Usage
//!
//! ```bash
//! # In-memory store, defaults everywhere
//! pulse-server
//!
//! # Durable store and baseline checkpoint
//! pulse-server --store-path /var/lib/pulse/metrics.jsonl \
//!     --checkpoint-path /var/lib/pulse/baselines.json --bind 0.0.0.0:9100
//! ```

use clap::Parser;
use pulse_server::{router, shutdown_signal, AppContext, Args, ServerError};
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Pulse Server v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ServerError> {
    let settings = args.into_settings()?;
    let addr = settings.bind;
    let ctx = AppContext::build(settings).await?;

    let listener = TcpListener::bind(addr).await?;
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    let served = axum::serve(listener, router(ctx.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Drain and checkpoint even if the listener failed.
    let report = ctx.shutdown().await?;
    info!(
        written = report.written,
        failed = report.failed,
        "Pulse Server stopped"
    );
    served?;
    Ok(())
}
