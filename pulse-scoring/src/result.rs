// Pulse Scoring - Online anomaly scoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Scored points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of scoring one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Observation time of the scored record.
    pub timestamp: DateTime<Utc>,
    /// Scored latency.
    pub latency: f64,
    /// True when `anomaly_probability <= threshold` on a warm baseline.
    pub is_anomaly: bool,
    /// Two-sided tail probability in [0, 1]; smaller is more anomalous.
    pub anomaly_probability: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let result = AnomalyResult {
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            latency: 1.5,
            is_anomaly: false,
            anomaly_probability: 1.0,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"timestamp\":\"2023-11-14T22:13:20Z\""));
        assert!(json.contains("\"is_anomaly\":false"));
        assert!(json.contains("\"anomaly_probability\":1.0"));

        let parsed: AnomalyResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }
}
