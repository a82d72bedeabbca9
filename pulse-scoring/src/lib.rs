// Pulse Scoring - Online anomaly scoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Pulse Scoring
//!
//! Per-stream online anomaly scoring for latency metrics.
//!
//! Every stream keeps a rolling baseline (mean and variance). A new point is
//! scored by its deviation from that baseline and the deviation is turned
//! into a two-sided Gaussian tail probability:
//!
//! - **Deviation**: `z = |x - mean| / max(spread, min_spread)`
//! - **Probability**: `p = erfc(z / sqrt(2))`, 1.0 for no deviation
//! - **Detection**: `is_anomaly = p <= threshold` once the baseline is warm
//!
//! ## Usage
//!
//! ```rust
//! use pulse::{MetricRecord, StreamId};
//! use pulse_scoring::{ScoringConfig, ScoringEngine};
//!
//! let engine = ScoringEngine::new(ScoringConfig::default()).unwrap();
//!
//! let points = [(1, 10.0), (2, 11.0), (3, 10.0), (4, 1000.0)];
//! let results: Vec<_> = points
//!     .iter()
//!     .map(|&(t, latency)| {
//!         let record = MetricRecord::at_epoch(StreamId::default(), t, latency).unwrap();
//!         engine.score(&record)
//!     })
//!     .collect();
//!
//! assert!(!results[2].is_anomaly);
//! assert!(results[3].is_anomaly);
//! assert!(results[3].anomaly_probability <= 0.01);
//! ```
//!
//! ## Key Concepts
//!
//! ### Models
//!
//! [`ScoringModel::Ewma`] tracks an exponentially weighted mean and variance;
//! [`ScoringModel::Window`] keeps the last `size` points. Both update in O(1).
//!
//! ### Warm-up
//!
//! A baseline holding fewer than `min_samples` points (at least 2) never
//! flags anything and reports a probability of 1.0.
//!
//! ### Baseline policy
//!
//! By default every point is fitted after it is scored
//! ([`BaselinePolicy::IncludeAll`]). [`BaselinePolicy::ExcludeAnomalies`]
//! keeps flagged points out of the baseline.
//!
//! ## Modules
//!
//! - [`config`]: Configuration and validation
//! - [`baseline`]: Baseline estimators and per-stream state
//! - [`tail`]: Deviation and tail probability
//! - [`result`]: Scored point
//! - [`engine`]: Per-stream engine
//! - [`checkpoint`]: Persisted baselines

pub mod baseline;
pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod result;
pub mod tail;

// Re-exports
pub use baseline::{Baseline, EwmaStats, Score, ScoringState, WindowStats};
pub use checkpoint::{CheckpointError, EngineCheckpoint, CHECKPOINT_VERSION};
pub use config::{
    BaselinePolicy, ConfigError, ScoringConfig, ScoringModel, DEFAULT_ALPHA, DEFAULT_THRESHOLD,
};
pub use engine::ScoringEngine;
pub use result::AnomalyResult;
pub use tail::{deviation, tail_probability};
