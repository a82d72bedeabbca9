// Pulse Pipeline - Ingestion and query plumbing
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! In-memory metric store.

use crate::error::StoreResult;
use crate::store::{in_window, MetricStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pulse::{DedupKey, MetricRecord, StreamId};
use std::collections::BTreeSet;

/// Append-only store held in process memory.
///
/// Rows are lost on restart; used for tests and single-process demos.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<MetricRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Copy of every stored row, in stored order.
    pub fn rows(&self) -> Vec<MetricRecord> {
        self.rows.read().clone()
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write(&self, records: &[MetricRecord]) -> StoreResult<()> {
        self.rows.write().extend_from_slice(records);
        Ok(())
    }

    async fn read_window(
        &self,
        stream: &StreamId,
        since: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<MetricRecord>> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|r| in_window(r, stream, since, until))
            .cloned()
            .collect())
    }

    async fn streams(&self) -> StoreResult<Vec<StreamId>> {
        let names: BTreeSet<StreamId> = self.rows.read().iter().map(|r| r.stream.clone()).collect();
        Ok(names.into_iter().collect())
    }

    async fn recent_keys(&self, limit: usize) -> StoreResult<Vec<DedupKey>> {
        let rows = self.rows.read();
        let skip = rows.len().saturating_sub(limit);
        Ok(rows.iter().skip(skip).map(MetricRecord::dedup_key).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(stream: &str, secs: i64) -> MetricRecord {
        MetricRecord::at_epoch(StreamId::parse(stream).unwrap(), secs, 1.0).unwrap()
    }

    #[tokio::test]
    async fn test_write_and_read_window() {
        let store = MemoryStore::new();
        store
            .write(&[record("a", 10), record("b", 15), record("a", 20), record("a", 30)])
            .await
            .unwrap();

        let a = StreamId::parse("a").unwrap();
        let until = DateTime::from_timestamp(25, 0).unwrap();
        let all = store.read_window(&a, None, until).await.unwrap();
        assert_eq!(all.len(), 2);

        let since = DateTime::from_timestamp(20, 0);
        let tail = store.read_window(&a, since, until).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].epoch_secs(), 20);
    }

    #[tokio::test]
    async fn test_streams_and_keys() {
        let store = MemoryStore::new();
        store
            .write(&[record("b", 1), record("a", 2), record("b", 3)])
            .await
            .unwrap();

        let streams = store.streams().await.unwrap();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].as_str(), "a");

        let keys = store.recent_keys(2).await.unwrap();
        assert_eq!(keys, vec![record("a", 2).dedup_key(), record("b", 3).dedup_key()]);
        assert_eq!(store.recent_keys(10).await.unwrap().len(), 3);
    }
}
