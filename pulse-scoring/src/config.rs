// Pulse Scoring - Online anomaly scoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Scoring configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default tail-probability threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.01;

/// Default EWMA decay factor.
pub const DEFAULT_ALPHA: f64 = 0.1;

/// Master configuration for the scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// A point is anomalous when its tail probability is at or below this.
    pub threshold: f64,

    /// Baseline estimator.
    pub model: ScoringModel,

    /// Which points feed the baseline after scoring.
    pub policy: BaselinePolicy,

    /// Points a baseline must hold before it may flag anything (>= 2).
    pub min_samples: u64,

    /// Floor applied to the spread before dividing (epsilon).
    pub min_spread: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            model: ScoringModel::default(),
            policy: BaselinePolicy::default(),
            min_samples: 2,
            min_spread: 1e-6,
        }
    }
}

impl ScoringConfig {
    /// Check every parameter is inside its domain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        if self.min_samples < 2 {
            return Err(ConfigError::InvalidMinSamples(self.min_samples));
        }
        if !(self.min_spread.is_finite() && self.min_spread > 0.0) {
            return Err(ConfigError::InvalidMinSpread(self.min_spread));
        }
        self.model.validate()
    }
}

/// Baseline estimator. Both variants update in O(1) per point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoringModel {
    /// Exponentially weighted mean and variance.
    Ewma {
        /// Decay factor in (0, 1]; higher reacts faster.
        alpha: f64,
    },
    /// Fixed-size sliding window of the most recent points.
    Window {
        /// Number of points retained (>= 2).
        size: usize,
    },
}

impl Default for ScoringModel {
    fn default() -> Self {
        ScoringModel::Ewma {
            alpha: DEFAULT_ALPHA,
        }
    }
}

impl ScoringModel {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            ScoringModel::Ewma { alpha } => {
                if !(alpha > 0.0 && alpha <= 1.0) {
                    return Err(ConfigError::InvalidAlpha(alpha));
                }
            }
            ScoringModel::Window { size } => {
                if size < 2 {
                    return Err(ConfigError::InvalidWindow(size));
                }
            }
        }
        Ok(())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringModel::Ewma { .. } => "ewma",
            ScoringModel::Window { .. } => "window",
        }
    }
}

/// Which scored points are folded into the baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselinePolicy {
    /// Every point updates the baseline, anomalous or not.
    ///
    /// Isolated spikes fade out at the model's decay rate and a sustained
    /// level shift becomes the new normal.
    #[default]
    IncludeAll,
    /// Flagged points are scored but not fitted.
    ///
    /// Keeps the baseline clean under sustained anomalies, at the cost of
    /// never adapting to a genuine level shift.
    ExcludeAnomalies,
}

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Threshold must be in (0, 1), got {0}")]
    InvalidThreshold(f64),

    #[error("EWMA alpha must be in (0, 1], got {0}")]
    InvalidAlpha(f64),

    #[error("Window size must be at least 2, got {0}")]
    InvalidWindow(usize),

    #[error("min_samples must be at least 2, got {0}")]
    InvalidMinSamples(u64),

    #[error("min_spread must be finite and positive, got {0}")]
    InvalidMinSpread(f64),
}
