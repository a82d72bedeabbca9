// Pulse Pipeline - Ingestion and query plumbing
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Append-only JSON lines store.
//!
//! One [`MetricRecord`] per line:
//!
//! ```text
//! {"stream":"checkout","timestamp":1700000000,"latency":12.5,"cpu":0.31}
//! ```
//!
//! The store is the only writer of its file. Each batch is written at the
//! end of the last complete batch and synced; a failed batch is truncated
//! away before the error is returned, so the file only ever grows by whole
//! batches. Bytes found past that point (a crash mid-append) are cut off on
//! open and before the next append.
//!
//! Rows are parsed once on open and kept in memory; reads never touch the
//! file.

use crate::error::StoreResult;
use crate::store::{in_window, MetricStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pulse::{DedupKey, MetricRecord, StreamId};
use std::collections::BTreeSet;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

/// Metric store backed by a local JSON lines file.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    appender: Mutex<Appender>,
    rows: RwLock<Vec<MetricRecord>>,
}

/// Write handle plus the length of the file's last complete batch.
#[derive(Debug)]
struct Appender {
    file: File,
    len: u64,
}

impl Appender {
    async fn append(&mut self, buf: &[u8]) -> io::Result<()> {
        self.discard_tail().await?;
        self.file.seek(SeekFrom::Start(self.len)).await?;
        self.file.write_all(buf).await?;
        self.file.flush().await?;
        self.file.sync_data().await
    }

    /// Cut anything past the last complete batch.
    async fn discard_tail(&mut self) -> io::Result<()> {
        let actual = self.file.metadata().await?.len();
        if actual > self.len {
            warn!(dropped_bytes = actual - self.len, "discarding bytes past the last complete batch");
            self.file.set_len(self.len).await?;
            self.file.sync_data().await?;
        } else if actual < self.len {
            return Err(io::Error::other(format!(
                "store file shrank from {} to {} bytes",
                self.len, actual
            )));
        }
        Ok(())
    }
}

impl JsonLinesStore {
    /// Open (or create) the store file, discarding a torn trailing line.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await?;

        let bytes = tokio::fs::read(&path).await?;
        let keep = bytes
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |i| i + 1);
        if keep < bytes.len() {
            warn!(
                path = %path.display(),
                dropped_bytes = bytes.len() - keep,
                "discarding torn trailing line"
            );
            file.set_len(keep as u64).await?;
            file.sync_all().await?;
        }
        let rows = parse_rows(&bytes[..keep])?;

        Ok(Self {
            path,
            appender: Mutex::new(Appender {
                file,
                len: keep as u64,
            }),
            rows: RwLock::new(rows),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

fn parse_rows(complete: &[u8]) -> StoreResult<Vec<MetricRecord>> {
    let mut records = Vec::new();
    for line in complete.split(|b| *b == b'\n') {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        records.push(serde_json::from_slice(line)?);
    }
    Ok(records)
}

#[async_trait]
impl MetricStore for JsonLinesStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn write(&self, records: &[MetricRecord]) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::with_capacity(records.len() * 80);
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }

        let mut appender = self.appender.lock().await;
        if let Err(e) = appender.append(&buf).await {
            // The file may hold part (or all) of the batch; a retry must not follow it.
            if let Err(rollback) = appender.discard_tail().await {
                warn!(
                    path = %self.path.display(),
                    error = %rollback,
                    "failed to roll back partial batch"
                );
            }
            return Err(e.into());
        }
        appender.len += buf.len() as u64;
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
