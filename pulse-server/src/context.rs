// Pulse Server - HTTP boundary for the Pulse pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Process-wide application context.
//!
//! Owns the store, the scoring engine, the ingestion buffer and the query
//! service. Built once in `main` and handed to the router; there are no
//! globals besides the Prometheus registry.

use crate::config::{Settings, StoreBackend};
use crate::error::ServerError;
use pulse_pipeline::{
    AnomalyQueryService, FlushReport, IngestBuffer, JsonLinesStore, MemoryStore, MetricStore,
};
use pulse_scoring::{CheckpointError, EngineCheckpoint, ScoringEngine};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Shared state behind every handler.
pub struct AppContext {
    pub settings: Settings,
    pub store: Arc<dyn MetricStore>,
    pub engine: Arc<ScoringEngine>,
    pub buffer: IngestBuffer,
    pub query: AnomalyQueryService,
    pub started: Instant,
    ready: AtomicBool,
}

impl AppContext {
    /// Open the configured store and start the pipeline.
    pub async fn build(settings: Settings) -> Result<Arc<Self>, ServerError> {
        let store: Arc<dyn MetricStore> = match &settings.store {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::JsonLines(path) => Arc::new(JsonLinesStore::open(path.clone()).await?),
        };
        Self::with_store(settings, store).await
    }

    /// Start the pipeline on an existing store.
    ///
    /// Restores the checkpoint when one exists and primes the dedup index.
    /// Must be called inside a tokio runtime.
    pub async fn with_store(
        settings: Settings,
        store: Arc<dyn MetricStore>,
    ) -> Result<Arc<Self>, ServerError> {
        let engine = Arc::new(ScoringEngine::new(settings.scoring.clone())?);

        if let Some(path) = settings.checkpoint_path.clone() {
            restore_checkpoint(&engine, path).await?;
        }

        let buffer = IngestBuffer::start(settings.buffer.clone(), Arc::clone(&store), Arc::clone(&engine));
        buffer.prime().await?;

        let query = AnomalyQueryService::new(
            Arc::clone(&store),
            Arc::clone(&engine),
            settings.query.clone(),
        );

        info!(
            store = store.name(),
            model = engine.config().model.as_str(),
            threshold = engine.config().threshold,
            batch_size = settings.buffer.max_batch_size,
            "pipeline started"
        );

        Ok(Arc::new(Self {
            settings,
            store,
            engine,
            buffer,
            query,
            started: Instant::now(),
            ready: AtomicBool::new(true),
        }))
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && !self.buffer.is_closed()
    }

    /// Stop accepting, drain the buffer and save the checkpoint.
    pub async fn shutdown(&self) -> Result<FlushReport, ServerError> {
        self.ready.store(false, Ordering::SeqCst);
        let report = self.buffer.shutdown().await;

        if let Some(path) = self.settings.checkpoint_path.clone() {
            let checkpoint = self.engine.checkpoint();
            let streams = checkpoint.len();
            let saved = tokio::task::spawn_blocking(move || checkpoint.save(&path))
                .await
                .map_err(|e| ServerError::Io(std::io::Error::other(e)))?;
            saved?;
            info!(streams, "checkpoint saved");
        }

        Ok(report)
    }
}

async fn restore_checkpoint(engine: &ScoringEngine, path: PathBuf) -> Result<(), ServerError> {
    if !tokio::fs::try_exists(&path).await? {
        info!(path = %path.display(), "no checkpoint, starting cold");
        return Ok(());
    }

    let shown = path.display().to_string();
    let checkpoint = tokio::task::spawn_blocking(move || EngineCheckpoint::load(&path))
        .await
        .map_err(|e| ServerError::Io(std::io::Error::other(e)))??;

    match engine.restore(checkpoint) {
        Ok(streams) => {
            info!(path = %shown, streams, "baselines restored");
            Ok(())
        }
        Err(e @ CheckpointError::ModelMismatch { .. }) => {
            warn!(path = %shown, error = %e, "checkpoint ignored, starting cold");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
