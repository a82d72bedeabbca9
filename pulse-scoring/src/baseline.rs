// Pulse Scoring - Online anomaly scoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Per-stream baselines.
//!
//! A [`Baseline`] is one of the [`ScoringModel`] estimators; a
//! [`ScoringState`] wraps it with the bookkeeping needed to score points.

use crate::config::{BaselinePolicy, ScoringConfig, ScoringModel};
use crate::result::AnomalyResult;
use crate::tail::{deviation, tail_probability};
use chrono::{DateTime, Utc};
use pulse::MetricRecord;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Exponentially weighted mean/variance.
///
/// While fewer than `1/alpha` points have been seen the effective decay is
/// `1/n`, which makes the early estimates the plain population mean and
/// variance instead of being dominated by the first point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EwmaStats {
    pub alpha: f64,
    pub mean: f64,
    pub variance: f64,
    pub count: u64,
}

impl EwmaStats {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            mean: 0.0,
            variance: 0.0,
            count: 0,
        }
    }

    pub fn fit(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.mean = value;
            self.variance = 0.0;
            return;
        }

        let a = self.alpha.max(1.0 / self.count as f64);
        let diff = value - self.mean;
        self.mean += a * diff;
        self.variance = (1.0 - a) * (self.variance + a * diff * diff);
    }
}

/// Sliding window over the most recent `capacity` points.
///
/// Running sums give O(1) updates; they are re-derived from the window
/// once per `capacity` evictions to stop floating-point drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub capacity: usize,
    samples: VecDeque<f64>,
    sum: f64,
    sum_sq: f64,
    evictions: usize,
    count: u64,
}

impl WindowStats {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity + 1),
            sum: 0.0,
            sum_sq: 0.0,
            evictions: 0,
            count: 0,
        }
    }

    pub fn fit(&mut self, value: f64) {
        self.count += 1;
        self.samples.push_back(value);
        self.sum += value;
        self.sum_sq += value * value;

        while self.samples.len() > self.capacity {
            if let Some(old) = self.samples.pop_front() {
                self.sum -= old;
                self.sum_sq -= old * old;
                self.evictions += 1;
            }
        }

        if self.evictions >= self.capacity {
            self.resync();
        }
    }

    fn resync(&mut self) {
        self.sum = self.samples.iter().sum();
        self.sum_sq = self.samples.iter().map(|v| v * v).sum();
        self.evictions = 0;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.sum / self.samples.len() as f64
    }

    pub fn variance(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let n = self.samples.len() as f64;
        let mean = self.sum / n;
        (self.sum_sq / n - mean * mean).max(0.0)
    }
}

/// Baseline estimator for one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Baseline {
    Ewma(EwmaStats),
    Window(WindowStats),
}

impl Baseline {
    pub fn for_model(model: &ScoringModel) -> Self {
        match *model {
            ScoringModel::Ewma { alpha } => Baseline::Ewma(EwmaStats::new(alpha)),
            ScoringModel::Window { size } => Baseline::Window(WindowStats::new(size)),
        }
    }

    /// Fold one point into the estimate.
    pub fn fit(&mut self, value: f64) {
        match self {
            Baseline::Ewma(stats) => stats.fit(value),
            Baseline::Window(stats) => stats.fit(value),
        }
    }

    pub fn mean(&self) -> f64 {
        match self {
            Baseline::Ewma(stats) => stats.mean,
            Baseline::Window(stats) => stats.mean(),
        }
    }

    pub fn variance(&self) -> f64 {
        match self {
            Baseline::Ewma(stats) => stats.variance,
            Baseline::Window(stats) => stats.variance(),
        }
    }

    pub fn spread(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Points fitted over the baseline's lifetime.
    pub fn count(&self) -> u64 {
        match self {
            Baseline::Ewma(stats) => stats.count,
            Baseline::Window(stats) => stats.count,
        }
    }

    /// True if this baseline was built by `model` with the same parameter.
    pub fn matches(&self, model: &ScoringModel) -> bool {
        match (self, model) {
            (Baseline::Ewma(stats), ScoringModel::Ewma { alpha }) => stats.alpha == *alpha,
            (Baseline::Window(stats), ScoringModel::Window { size }) => stats.capacity == *size,
            _ => false,
        }
    }
}

/// Deviation of one value against a baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub z: f64,
    pub probability: f64,
    pub is_anomaly: bool,
}

/// Rolling baseline of one stream plus its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringState {
    baseline: Baseline,
    last_updated: Option<DateTime<Utc>>,
}

impl ScoringState {
    pub fn new(model: &ScoringModel) -> Self {
        Self {
            baseline: Baseline::for_model(model),
            last_updated: None,
        }
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn mean(&self) -> f64 {
        self.baseline.mean()
    }

    pub fn variance(&self) -> f64 {
        self.baseline.variance()
    }

    pub fn count(&self) -> u64 {
        self.baseline.count()
    }

    /// Latest observation time fitted so far (out-of-order points never move it back).
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Score a value without touching the baseline.
    pub fn score(&self, value: f64, config: &ScoringConfig) -> Score {
        if self.count() < config.min_samples {
            return Score {
                z: 0.0,
                probability: 1.0,
                is_anomaly: false,
            };
        }

        let z = deviation(
            value,
            self.baseline.mean(),
            self.baseline.spread(),
            config.min_spread,
        );
        let probability = tail_probability(z);
        Score {
            z,
            probability,
            is_anomaly: probability <= config.threshold,
        }
    }

    /// Score a record, then fold it into the baseline according to the policy.
    pub fn observe(&mut self, record: &MetricRecord, config: &ScoringConfig) -> AnomalyResult {
        let score = self.score(record.latency, config);

        let fit = match config.policy {
            BaselinePolicy::IncludeAll => true,
            BaselinePolicy::ExcludeAnomalies => !score.is_anomaly,
        };
        if fit {
            self.baseline.fit(record.latency);
            self.last_updated = Some(match self.last_updated {
                Some(seen) => seen.max(record.timestamp),
                None => record.timestamp,
            });
        }

        AnomalyResult {
            timestamp: record.timestamp,
            latency: record.latency,
            is_anomaly: score.is_anomaly,
            anomaly_probability: score.probability,
        }
    }
}
