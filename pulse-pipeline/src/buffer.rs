// Pulse Pipeline - Ingestion and query plumbing
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Ingestion buffer.
//!
//! Validated records are batched and written to the [`MetricStore`] with
//! retry. Each record's key is committed, and the record scored online,
//! only after its batch is durable.
//!
//! ## Redeliveries
//!
//! The transport delivers at least once. A record whose key is already
//! committed is acknowledged as [`Ack::Duplicate`] without touching the
//! store or the scoring engine. A record whose key is pending or in flight
//! joins the existing slot and receives the same outcome as the first
//! delivery.
//!
//! ## Cancellation
//!
//! Every slot is a `watch` channel. A caller that abandons `accept` drops
//! its receiver; a pending slot with no receivers left is discarded at the
//! next flush instead of being written.

use crate::config::BufferConfig;
use crate::dedup::DedupIndex;
use crate::error::{IngestError, StoreError};
use crate::retry::with_retry;
use crate::store::MetricStore;
use parking_lot::Mutex;
use pulse::{DedupKey, MetricRecord};
use pulse_scoring::{AnomalyResult, ScoringEngine};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Positive acknowledgment of an accepted record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Ack {
    /// Durably written and scored
    Stored(AnomalyResult),
    /// Already written by an earlier delivery
    Duplicate,
}

type Outcome = Option<Result<Ack, IngestError>>;
type Notifier = Arc<watch::Sender<Outcome>>;

struct Slot {
    key: DedupKey,
    record: MetricRecord,
    tx: Notifier,
}

struct BufferState {
    /// Waiting for the next flush, in arrival order
    pending: Vec<Slot>,
    /// Every pending or in-flight key
    waiting: HashMap<DedupKey, Notifier>,
    committed: DedupIndex,
    closed: bool,
}

/// What one flush did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub written: usize,
    pub failed: usize,
    pub abandoned: usize,
}

/// Cumulative buffer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub accepted: u64,
    pub duplicates: u64,
    pub joined: u64,
    pub rejected: u64,
    pub batches: u64,
    pub batches_failed: u64,
    pub rows_written: u64,
    pub rows_failed: u64,
    pub write_attempts: u64,
    pub abandoned: u64,
    pub anomalies: u64,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    duplicates: AtomicU64,
    joined: AtomicU64,
    rejected: AtomicU64,
    batches: AtomicU64,
    batches_failed: AtomicU64,
    rows_written: AtomicU64,
    rows_failed: AtomicU64,
    write_attempts: AtomicU64,
    abandoned: AtomicU64,
    anomalies: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

struct Inner {
    config: BufferConfig,
    store: Arc<dyn MetricStore>,
    engine: Arc<ScoringEngine>,
    state: Mutex<BufferState>,
    /// Serializes flushes so batches are written and scored in order
    flush_lock: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    flusher: Mutex<Option<JoinHandle<()>>>,
    counters: Counters,
}

/// Batching, idempotent writer in front of a [`MetricStore`].
///
/// Cheap to clone; clones share one buffer.
#[derive(Clone)]
pub struct IngestBuffer {
    inner: Arc<Inner>,
}

impl IngestBuffer {
    /// Create a buffer without a background flusher.
    ///
    /// Records are written when the batch size is reached or on
    /// [`flush`](Self::flush). Must be used inside a tokio runtime.
    pub fn new(
        config: BufferConfig,
        store: Arc<dyn MetricStore>,
        engine: Arc<ScoringEngine>,
    ) -> Self {
        let committed = DedupIndex::new(config.dedup_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                engine,
                state: Mutex::new(BufferState {
                    pending: Vec::new(),
                    waiting: HashMap::new(),
                    committed,
                    closed: false,
                }),
                flush_lock: tokio::sync::Mutex::new(()),
                shutdown: CancellationToken::new(),
                flusher: Mutex::new(None),
                counters: Counters::default(),
            }),
        }
    }

    /// Create a buffer and spawn its interval flusher.
    pub fn start(
        config: BufferConfig,
        store: Arc<dyn MetricStore>,
        engine: Arc<ScoringEngine>,
    ) -> Self {
        let buffer = Self::new(config, store, engine);
        buffer.spawn_flusher();
        buffer
    }

    fn spawn_flusher(&self) {
        let weak = Arc::downgrade(&self.inner);
        let token = self.inner.shutdown.clone();
        let period = self.inner.config.flush_interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        inner.flush().await;
                    }
                }
            }
            debug!("flusher stopped");
        });

        *self.inner.flusher.lock() = Some(handle);
    }

    /// Load recently stored keys so redeliveries across a restart are
    /// recognized. Returns how many keys were added.
    pub async fn prime(&self) -> Result<usize, StoreError> {
        let capacity = self.inner.state.lock().committed.capacity();
        let keys = self.inner.store.recent_keys(capacity).await?;
        let added = self.inner.state.lock().committed.extend(keys);
        info!(keys = added, store = self.inner.store.name(), "dedup index primed");
        Ok(added)
    }

    /// Buffer a record and wait for its outcome.
    pub async fn accept(&self, record: MetricRecord) -> Result<Ack, IngestError> {
        let counters = &self.inner.counters;
        let key = record.dedup_key();

        let (mut rx, flush_now) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                bump(&counters.rejected, 1);
                return Err(IngestError::ShuttingDown);
            }
            if state.committed.contains(&key) {
                bump(&counters.duplicates, 1);
                debug!(stream = %record.stream, key = %key, "duplicate delivery");
                return Ok(Ack::Duplicate);
            }

            let joined = state.waiting.get(&key).map(|tx| tx.subscribe());
            match joined {
                Some(rx) => {
                    bump(&counters.joined, 1);
                    (rx, false)
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    let tx = Arc::new(tx);
                    state.waiting.insert(key, Arc::clone(&tx));
                    state.pending.push(Slot { key, record, tx });
                    bump(&counters.accepted, 1);
                    (rx, state.pending.len() >= self.inner.config.max_batch_size)
                }
            }
        };

        if flush_now {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.flush().await;
            });
        }

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(IngestError::Cancelled))
    }

    /// Write everything pending now.
    pub async fn flush(&self) -> FlushReport {
        self.inner.flush().await
    }

    /// Records waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Records pending or being written.
    pub fn unsettled(&self) -> usize {
        self.inner.state.lock().waiting.len()
    }

    /// Keys currently remembered as committed.
    pub fn committed(&self) -> usize {
        self.inner.state.lock().committed.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn stats(&self) -> BufferStats {
        let c = &self.inner.counters;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        BufferStats {
            accepted: load(&c.accepted),
            duplicates: load(&c.duplicates),
            joined: load(&c.joined),
            rejected: load(&c.rejected),
            batches: load(&c.batches),
            batches_failed: load(&c.batches_failed),
            rows_written: load(&c.rows_written),
            rows_failed: load(&c.rows_failed),
            write_attempts: load(&c.write_attempts),
            abandoned: load(&c.abandoned),
            anomalies: load(&c.anomalies),
        }
    }

    /// Stop accepting, stop the flusher and write what is left.
    pub async fn shutdown(&self) -> FlushReport {
        self.inner.state.lock().closed = true;
        self.inner.shutdown.cancel();

        let flusher = self.inner.flusher.lock().take();
        if let Some(handle) = flusher {
            if let Err(e) = handle.await {
                warn!(error = %e, "flusher task ended abnormally");
            }
        }

        let report = self.inner.flush().await;
        info!(
            written = report.written,
            failed = report.failed,
            "ingestion buffer drained"
        );
        report
    }
}

impl Inner {
    async fn flush(&self) -> FlushReport {
        let _serial = self.flush_lock.lock().await;
        let mut report = FlushReport::default();

        let batch: Vec<Slot> = {
            let mut state = self.state.lock();
            let drained = std::mem::take(&mut state.pending);
            let mut batch = Vec::with_capacity(drained.len());
            for slot in drained {
                if slot.tx.receiver_count() == 0 {
                    state.waiting.remove(&slot.key);
                    report.abandoned += 1;
                } else {
                    batch.push(slot);
                }
            }
            batch
        };

        if report.abandoned > 0 {
            bump(&self.counters.abandoned, report.abandoned as u64);
            debug!(records = report.abandoned, "discarded abandoned records");
        }

        for chunk in batch.chunks(self.config.max_batch_size.max(1)) {
            let records: Vec<MetricRecord> = chunk.iter().map(|s| s.record.clone()).collect();
            bump(&self.counters.batches, 1);

            match with_retry(&self.config.retry, || self.store.write(&records)).await {
                Ok(done) => {
                    bump(&self.counters.write_attempts, done.attempts as u64);
                    self.commit(chunk);
                    report.written += chunk.len();
                    debug!(
                        store = self.store.name(),
                        rows = chunk.len(),
                        attempts = done.attempts,
                        elapsed_ms = done.total_duration.as_millis() as u64,
                        "batch written"
                    );
                }
                Err(exhausted) => {
                    bump(&self.counters.write_attempts, exhausted.attempts as u64);
                    bump(&self.counters.batches_failed, 1);
                    bump(&self.counters.rows_failed, chunk.len() as u64);
                    let reason = exhausted.error.to_string();
                    error!(
                        store = self.store.name(),
                        rows = chunk.len(),
                        attempts = exhausted.attempts,
                        error = %reason,
                        "batch write failed"
                    );
                    self.fail(chunk, exhausted.attempts, &reason);
                    report.failed += chunk.len();
                }
            }
        }

        report
    }

    /// Commit a durable chunk, then score it and notify its waiters.
    fn commit(&self, chunk: &[Slot]) {
        {
            let mut state = self.state.lock();
            for slot in chunk {
                state.waiting.remove(&slot.key);
                state.committed.insert(slot.key);
            }
        }
        bump(&self.counters.rows_written, chunk.len() as u64);

        let started = Instant::now();
        for slot in chunk {
            let result = self.engine.score(&slot.record);
            if result.is_anomaly {
                bump(&self.counters.anomalies, 1);
                info!(
                    stream = %slot.record.stream,
                    timestamp = slot.record.epoch_secs(),
                    latency = result.latency,
                    probability = result.anomaly_probability,
                    "anomaly detected"
                );
            }
            slot.tx.send_replace(Some(Ok(Ack::Stored(result))));
        }
        debug!(
            rows = chunk.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "batch scored"
        );
    }

    /// Release a chunk that never became durable.
    fn fail(&self, chunk: &[Slot], attempts: u32, reason: &str) {
        {
            let mut state = self.state.lock();
            for slot in chunk {
                state.waiting.remove(&slot.key);
            }
        }
        for slot in chunk {
            slot.tx.send_replace(Some(Err(IngestError::PersistFailure {
                attempts,
                reason: reason.to_string(),
            })));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use pulse::StreamId;
    use pulse_scoring::ScoringConfig;

    fn record(secs: i64, latency: f64) -> MetricRecord {
        MetricRecord::at_epoch(StreamId::default(), secs, latency).unwrap()
    }

    fn buffer(max_batch_size: usize) -> (IngestBuffer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(ScoringEngine::new(ScoringConfig::default()).unwrap());
        let config = BufferConfig {
            max_batch_size,
            ..Default::default()
        };
        (IngestBuffer::new(config, store.clone(), engine), store)
    }

    #[tokio::test]
    async fn test_batch_size_triggers_flush() {
        let (buffer, store) = buffer(1);
        let ack = buffer.accept(record(1, 10.0)).await.unwrap();
        assert!(matches!(ack, Ack::Stored(_)));
        assert_eq!(store.len(), 1);
        assert_eq!(buffer.committed(), 1);
        assert_eq!(buffer.unsettled(), 0);
    }

    #[tokio::test]
    async fn test_committed_key_is_duplicate() {
        let (buffer, store) = buffer(1);
        buffer.accept(record(1, 10.0)).await.unwrap();
        let again = buffer.accept(record(1, 99.0)).await.unwrap();

        assert_eq!(again, Ack::Duplicate);
        assert_eq!(store.len(), 1);
        assert_eq!(buffer.stats().duplicates, 1);
    }

    #[tokio::test]
    async fn test_explicit_flush() {
        let (buffer, store) = buffer(100);
        let waiter = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.accept(record(1, 10.0)).await })
        };
        while buffer.pending() == 0 {
            tokio::task::yield_now().await;
        }

        let report = buffer.flush().await;
        assert_eq!(report.written, 1);
        assert!(matches!(waiter.await.unwrap(), Ok(Ack::Stored(_))));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_records() {
        let (buffer, _store) = buffer(100);
        buffer.shutdown().await;
        assert!(buffer.is_closed());
        assert_eq!(
            buffer.accept(record(1, 1.0)).await,
            Err(IngestError::ShuttingDown)
        );
        assert_eq!(buffer.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_prime_keeps_newest_keys_up_to_capacity() {
        let store = Arc::new(MemoryStore::new());
        store
            .write(&[record(1, 1.0), record(2, 1.0), record(3, 1.0)])
            .await
            .unwrap();
        let engine = Arc::new(ScoringEngine::new(ScoringConfig::default()).unwrap());
        let config = BufferConfig {
            max_batch_size: 1,
            dedup_capacity: 2,
            ..Default::default()
        };
        let buffer = IngestBuffer::new(config, store.clone(), engine);

        assert_eq!(buffer.prime().await.unwrap(), 2);
        assert_eq!(buffer.accept(record(3, 1.0)).await, Ok(Ack::Duplicate));
        assert!(matches!(
            buffer.accept(record(1, 1.0)).await,
            Ok(Ack::Stored(_))
        ));
    }

    #[tokio::test]
    async fn test_ack_json() {
        let json = serde_json::to_string(&Ack::Duplicate).unwrap();
        assert_eq!(json, r#"{"status":"duplicate"}"#);

        let stored = Ack::Stored(AnomalyResult {
            timestamp: record(1, 2.0).timestamp,
            latency: 2.0,
            is_anomaly: false,
            anomaly_probability: 1.0,
        });
        let json = serde_json::to_string(&stored).unwrap();
        assert!(json.starts_with(r#"{"status":"stored","timestamp":"#));
    }
}
