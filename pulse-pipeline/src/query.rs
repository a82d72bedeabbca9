// Pulse Pipeline - Ingestion and query plumbing
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Anomaly query service.
//!
//! Queries re-score the stored series: the stream's read window is run
//! through [`ScoringEngine::score_batch`] with fresh baselines, so the
//! answer depends only on what is durably stored and never on the online
//! state.

use crate::config::QueryConfig;
use crate::error::QueryError;
use crate::store::MetricStore;
use chrono::{DateTime, Utc};
use pulse::{MetricRecord, StreamId};
use pulse_scoring::{AnomalyResult, ScoringEngine};
use std::sync::Arc;
use tracing::{debug, warn};

/// Parameters of one anomaly query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnomalyQuery {
    pub stream: StreamId,
    /// Falls back to the configured default
    pub limit: Option<usize>,
    /// Keep only points flagged as anomalous
    pub anomalies_only: bool,
}

impl AnomalyQuery {
    pub fn new(stream: StreamId) -> Self {
        Self {
            stream,
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn anomalies_only(mut self) -> Self {
        self.anomalies_only = true;
        self
    }
}

/// Serves the most recent scored points of a stream.
pub struct AnomalyQueryService {
    store: Arc<dyn MetricStore>,
    engine: Arc<ScoringEngine>,
    config: QueryConfig,
}

impl AnomalyQueryService {
    pub fn new(store: Arc<dyn MetricStore>, engine: Arc<ScoringEngine>, config: QueryConfig) -> Self {
        Self {
            store,
            engine,
            config,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Effective limit for a requested one.
    pub fn resolve_limit(&self, requested: Option<usize>) -> Result<usize, QueryError> {
        match requested {
            None => Ok(self.config.default_limit.clamp(1, self.config.max_limit.max(1))),
            Some(0) => Err(QueryError::InvalidLimit(0)),
            Some(n) => Ok(n.min(self.config.max_limit.max(1))),
        }
    }

    /// Most recent results, strictly descending by timestamp.
    pub async fn recent_anomalies(
        &self,
        query: &AnomalyQuery,
    ) -> Result<Vec<AnomalyResult>, QueryError> {
        self.recent_anomalies_at(query, Utc::now()).await
    }

    /// Same as [`recent_anomalies`](Self::recent_anomalies) with an explicit clock.
    pub async fn recent_anomalies_at(
        &self,
        query: &AnomalyQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<AnomalyResult>, QueryError> {
        let limit = self.resolve_limit(query.limit)?;
        let since = self
            .config
            .lookback
            .and_then(|lookback| chrono::Duration::from_std(lookback).ok())
            .and_then(|lookback| now.checked_sub_signed(lookback));

        let mut records = self
            .store
            .read_window(&query.stream, since, now)
            .await
            .map_err(|e| {
                warn!(
                    store = self.store.name(),
                    stream = %query.stream,
                    error = %e,
                    "anomaly query read failed"
                );
                QueryError::from(e)
            })?;

        collapse_equal_timestamps(&mut records);
        let scored = self.engine.score_batch(&records);

        let results: Vec<AnomalyResult> = scored
            .into_iter()
            .rev()
            .filter(|r| !query.anomalies_only || r.is_anomaly)
            .take(limit)
            .collect();

        debug!(
            stream = %query.stream,
            rows = records.len(),
            returned = results.len(),
            limit,
            "anomaly query served"
        );
        Ok(results)
    }
}

/// Order by timestamp, keeping the first stored row for each timestamp.
fn collapse_equal_timestamps(records: &mut Vec<MetricRecord>) {
    records.sort_by_key(|r| r.timestamp);
    records.dedup_by_key(|r| r.timestamp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_scoring::ScoringConfig;

    fn service(config: QueryConfig) -> AnomalyQueryService {
        let store = Arc::new(crate::memory::MemoryStore::new());
        let engine = Arc::new(ScoringEngine::new(ScoringConfig::default()).unwrap());
        AnomalyQueryService::new(store, engine, config)
    }

    #[test]
    fn test_resolve_limit() {
        let service = service(QueryConfig {
            max_limit: 50,
            ..Default::default()
        });
        assert_eq!(service.resolve_limit(None).unwrap(), 50);
        assert_eq!(service.resolve_limit(Some(7)).unwrap(), 7);
        assert_eq!(service.resolve_limit(Some(500)).unwrap(), 50);
        assert!(matches!(
            service.resolve_limit(Some(0)),
            Err(QueryError::InvalidLimit(0))
        ));
    }

    #[test]
    fn test_collapse_keeps_first_row() {
        let stream = StreamId::default();
        let mut records = vec![
            MetricRecord::at_epoch(stream.clone(), 2, 20.0).unwrap(),
            MetricRecord::at_epoch(stream.clone(), 1, 10.0).unwrap(),
            MetricRecord::at_epoch(stream, 2, 99.0).unwrap(),
        ];
        collapse_equal_timestamps(&mut records);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].latency, 20.0);
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let results = service(QueryConfig::default())
            .recent_anomalies(&AnomalyQuery::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
