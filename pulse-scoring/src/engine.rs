// Pulse Scoring - Online anomaly scoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! ScoringEngine - per-stream online scoring.

use crate::baseline::ScoringState;
use crate::checkpoint::{CheckpointError, EngineCheckpoint};
use crate::config::{ConfigError, ScoringConfig};
use crate::result::AnomalyResult;
use dashmap::DashMap;
use parking_lot::Mutex;
use pulse::{MetricRecord, StreamId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type StreamHandle = Arc<Mutex<ScoringState>>;

/// Scores records against a lazily created baseline per stream.
///
/// Shared between tasks behind an `Arc`. The map is only touched to fetch a
/// stream's handle; scoring then holds that stream's lock alone, so
/// independent streams never wait on each other.
pub struct ScoringEngine {
    config: ScoringConfig,
    streams: DashMap<StreamId, StreamHandle>,
    /// Total points scored online.
    scored: AtomicU64,
}

impl ScoringEngine {
    /// Create an engine after validating `config`.
    pub fn new(config: ScoringConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            streams: DashMap::new(),
            scored: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    fn handle(&self, stream: &StreamId) -> StreamHandle {
        if let Some(handle) = self.streams.get(stream) {
            return Arc::clone(handle.value());
        }
        let handle = self
            .streams
            .entry(stream.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ScoringState::new(&self.config.model))));
        Arc::clone(handle.value())
    }

    /// Score one record online and fold it into its stream's baseline.
    pub fn score(&self, record: &MetricRecord) -> AnomalyResult {
        let handle = self.handle(&record.stream);
        let result = handle.lock().observe(record, &self.config);
        self.scored.fetch_add(1, Ordering::Relaxed);
        result
    }

    /// Score a historical series retrospectively.
    ///
    /// Uses fresh baselines that never touch the online state. Points are
    /// ordered by timestamp (stable for ties) and results come back in that
    /// order.
    pub fn score_batch(&self, records: &[MetricRecord]) -> Vec<AnomalyResult> {
        let mut ordered: Vec<&MetricRecord> = records.iter().collect();
        ordered.sort_by_key(|r| r.timestamp);

        let mut states: HashMap<&StreamId, ScoringState> = HashMap::new();
        ordered
            .into_iter()
            .map(|record| {
                states
                    .entry(&record.stream)
                    .or_insert_with(|| ScoringState::new(&self.config.model))
                    .observe(record, &self.config)
            })
            .collect()
    }

    /// Discard one stream's baseline. Returns false if the stream was unknown.
    pub fn reset(&self, stream: &StreamId) -> bool {
        let handle = match self.streams.get(stream) {
            Some(handle) => Arc::clone(handle.value()),
            None => return false,
        };
        *handle.lock() = ScoringState::new(&self.config.model);
        true
    }

    /// Discard every baseline, returning how many streams were dropped.
    pub fn reset_all(&self) -> usize {
        let dropped = self.streams.len();
        self.streams.clear();
        dropped
    }

    /// Points fitted into a stream's baseline (0 if unknown).
    pub fn sample_count(&self, stream: &StreamId) -> u64 {
        let handle = match self.streams.get(stream) {
            Some(handle) => Arc::clone(handle.value()),
            None => return 0,
        };
        let count = handle.lock().count();
        count
    }

    /// Copy of a stream's current state.
    pub fn state(&self, stream: &StreamId) -> Option<ScoringState> {
        let handle = Arc::clone(self.streams.get(stream)?.value());
        let state = handle.lock().clone();
        Some(state)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Known streams, sorted.
    pub fn streams(&self) -> Vec<StreamId> {
        let mut names: Vec<StreamId> = self.streams.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Total points scored online since start.
    pub fn scored_total(&self) -> u64 {
        self.scored.load(Ordering::Relaxed)
    }

    /// Snapshot every baseline.
    pub fn checkpoint(&self) -> EngineCheckpoint {
        let handles: Vec<(StreamId, StreamHandle)> = self
            .streams
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        let streams: BTreeMap<StreamId, ScoringState> = handles
            .into_iter()
            .map(|(stream, handle)| {
                let state = handle.lock().clone();
                (stream, state)
            })
            .collect();

        EngineCheckpoint::new(self.config.model.clone(), streams)
    }

    /// Replace the online state with a checkpoint's baselines.
    ///
    /// Fails without touching the engine if the checkpoint was taken with a
    /// different model.
    pub fn restore(&self, checkpoint: EngineCheckpoint) -> Result<usize, CheckpointError> {
        if checkpoint.model != self.config.model
            || checkpoint
                .streams
                .values()
                .any(|s| !s.baseline().matches(&self.config.model))
        {
            return Err(CheckpointError::ModelMismatch {
                expected: self.config.model.clone(),
                found: checkpoint.model,
            });
        }

        let restored = checkpoint.streams.len();
        self.streams.clear();
        for (stream, state) in checkpoint.streams {
            self.streams.insert(stream, Arc::new(Mutex::new(state)));
        }
        Ok(restored)
    }
}
