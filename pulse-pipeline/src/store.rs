// Pulse Pipeline - Ingestion and query plumbing
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Time-series store adapter.
//!
//! The store is an append-only table of [`MetricRecord`] rows. It is not
//! required to enforce uniqueness; the ingestion buffer deduplicates.

use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse::{DedupKey, MetricRecord, StreamId};

/// Append-only metric table.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Append a batch. Either every row becomes durable or the call fails.
    async fn write(&self, records: &[MetricRecord]) -> StoreResult<()>;

    /// Rows of `stream` with `since <= timestamp <= until`, in stored order.
    ///
    /// `since = None` reads from the beginning of the stream.
    async fn read_window(
        &self,
        stream: &StreamId,
        since: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<MetricRecord>>;

    /// Streams with at least one row, sorted.
    async fn streams(&self) -> StoreResult<Vec<StreamId>>;

    /// Dedup keys of the most recently stored rows, oldest first.
    async fn recent_keys(&self, limit: usize) -> StoreResult<Vec<DedupKey>>;
}

pub(crate) fn in_window(
    record: &MetricRecord,
    stream: &StreamId,
    since: Option<DateTime<Utc>>,
    until: DateTime<Utc>,
) -> bool {
    &record.stream == stream
        && since.map_or(true, |since| record.timestamp >= since)
        && record.timestamp <= until
}
