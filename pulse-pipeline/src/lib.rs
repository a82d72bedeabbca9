// Pulse Pipeline - Ingestion and query plumbing
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Pulse Pipeline
//!
//! Everything between a decoded [`MetricRecord`](pulse::MetricRecord) and
//! the anomaly answers served to callers.
//!
//! ## Overview
//!
//! ```text
//! record ──► IngestBuffer ──► MetricStore::write ──► ScoringEngine::score
//!                                    │
//! query  ◄── AnomalyQueryService ◄───┘ read_window + score_batch
//! ```
//!
//! - [`IngestBuffer`]: batching, dedup, retry with backoff, online scoring
//!   after durable write
//! - [`MetricStore`]: append-only table, with [`MemoryStore`] and
//!   [`JsonLinesStore`] backends
//! - [`AnomalyQueryService`]: most recent scored points, newest first
//!
//! ## Example
//!
//! ```rust
//! use pulse::{MetricRecord, StreamId};
//! use pulse_pipeline::{Ack, BufferConfig, IngestBuffer, MemoryStore};
//! use pulse_scoring::{ScoringConfig, ScoringEngine};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(MemoryStore::new());
//! let engine = Arc::new(ScoringEngine::new(ScoringConfig::default()).unwrap());
//! let config = BufferConfig { max_batch_size: 1, ..Default::default() };
//! let buffer = IngestBuffer::new(config, store.clone(), engine);
//!
//! let record = MetricRecord::at_epoch(StreamId::default(), 1_700_000_000, 12.5).unwrap();
//! assert!(matches!(buffer.accept(record.clone()).await, Ok(Ack::Stored(_))));
//! assert_eq!(buffer.accept(record).await, Ok(Ack::Duplicate));
//! assert_eq!(store.len(), 1);
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod dedup;
pub mod error;
pub mod jsonl;
pub mod memory;
pub mod query;
pub mod retry;
pub mod store;

pub use buffer::{Ack, BufferStats, FlushReport, IngestBuffer};
pub use config::{BufferConfig, QueryConfig, DEFAULT_BATCH_SIZE, DEFAULT_QUERY_LIMIT};
pub use dedup::DedupIndex;
pub use error::{IngestError, QueryError, StoreError, StoreResult};
pub use jsonl::JsonLinesStore;
pub use memory::MemoryStore;
pub use query::{AnomalyQuery, AnomalyQueryService};
pub use retry::{with_retry, RetryExhausted, RetryResult, RetryStrategy};
pub use store::MetricStore;
