// Pulse Scoring - Integration Tests
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

use approx::assert_relative_eq;
use pulse::{MetricRecord, StreamId};
use pulse_scoring::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::thread;

// ============================================================================
// Helper Functions
// ============================================================================

fn record(stream: &str, secs: i64, latency: f64) -> MetricRecord {
    MetricRecord::at_epoch(StreamId::parse(stream).unwrap(), secs, latency).unwrap()
}

fn engine() -> ScoringEngine {
    ScoringEngine::new(ScoringConfig::default()).unwrap()
}

fn window_engine(size: usize) -> ScoringEngine {
    ScoringEngine::new(ScoringConfig {
        model: ScoringModel::Window { size },
        ..Default::default()
    })
    .unwrap()
}

// ============================================================================
// Detection scenarios
// ============================================================================

#[test]
fn test_spike_after_steady_series() {
    let engine = engine();
    let results: Vec<AnomalyResult> = [(1, 10.0), (2, 11.0), (3, 10.0), (4, 1000.0)]
        .iter()
        .map(|&(t, v)| engine.score(&record("default", t, v)))
        .collect();

    assert!(!results[0].is_anomaly);
    assert!(!results[1].is_anomaly);
    assert!(!results[2].is_anomaly);
    assert!(results[3].is_anomaly);
    assert!(results[3].anomaly_probability <= 0.01);

    // t=3 sits one spread below a baseline of {10, 11}
    assert_relative_eq!(results[2].anomaly_probability, 0.3173105, epsilon = 1e-6);
}

#[test]
fn test_same_scenario_in_window_model() {
    let engine = window_engine(16);
    let results: Vec<AnomalyResult> = [(1, 10.0), (2, 11.0), (3, 10.0), (4, 1000.0)]
        .iter()
        .map(|&(t, v)| engine.score(&record("default", t, v)))
        .collect();

    assert_eq!(
        results.iter().map(|r| r.is_anomaly).collect::<Vec<_>>(),
        vec![false, false, false, true]
    );
}

#[test]
fn test_cold_start_never_flags_second_point() {
    let engine = engine();
    engine.score(&record("fresh", 1, 5.0));
    let second = engine.score(&record("fresh", 2, 5_000_000.0));
    assert!(!second.is_anomaly);
    assert_eq!(second.anomaly_probability, 1.0);
}

#[test]
fn test_noise_rarely_flags() {
    let engine = engine();
    let mut rng = StdRng::seed_from_u64(11);

    let mut flagged = 0;
    for t in 0..5_000 {
        let latency = 100.0 + rng.gen_range(-5.0..5.0);
        if engine.score(&record("noise", t, latency)).is_anomaly {
            flagged += 1;
        }
    }
    // Uniform noise has lighter tails than a Gaussian
    assert!(flagged < 100, "flagged {} of 5000", flagged);
}

#[test]
fn test_probability_decreases_with_deviation() {
    let engine = engine();
    for (t, v) in [(1, 10.0), (2, 12.0), (3, 10.0), (4, 12.0)] {
        engine.score(&record("s", t, v));
    }
    let state = engine.state(&StreamId::parse("s").unwrap()).unwrap();
    let config = engine.config();

    let mut last = 1.0;
    for step in 1..40 {
        let value = state.mean() + step as f64 * 0.25;
        let p = state.score(value, config).probability;
        assert!(p < last);
        last = p;
    }
}

#[test]
fn test_results_stay_in_unit_interval() {
    let engine = engine();
    let mut rng = StdRng::seed_from_u64(3);
    for t in 0..2_000 {
        let latency = rng.gen_range(0.0..1e9f64);
        let result = engine.score(&record("wild", t, latency));
        assert!((0.0..=1.0).contains(&result.anomaly_probability));
    }
}

// ============================================================================
// Baseline policy
// ============================================================================

#[test]
fn test_include_all_adapts_to_level_shift() {
    let engine = engine();
    for t in 0..50 {
        engine.score(&record("shift", t, 10.0 + (t % 2) as f64));
    }
    let mut last = None;
    for t in 50..200 {
        last = Some(engine.score(&record("shift", t, 100.0 + (t % 2) as f64)));
    }
    assert!(!last.unwrap().is_anomaly);
}

#[test]
fn test_exclude_anomalies_keeps_flagging_shift() {
    let engine = ScoringEngine::new(ScoringConfig {
        policy: BaselinePolicy::ExcludeAnomalies,
        ..Default::default()
    })
    .unwrap();
    for t in 0..50 {
        engine.score(&record("shift", t, 10.0 + (t % 2) as f64));
    }
    let mut last = None;
    for t in 50..200 {
        last = Some(engine.score(&record("shift", t, 100.0 + (t % 2) as f64)));
    }
    assert!(last.unwrap().is_anomaly);
    assert_eq!(engine.sample_count(&StreamId::parse("shift").unwrap()), 50);
}

// ============================================================================
// Streams
// ============================================================================

#[test]
fn test_streams_are_independent() {
    let engine = engine();
    for t in 0..20 {
        engine.score(&record("fast", t, 1.0 + (t % 2) as f64));
        engine.score(&record("slow", t, 1000.0 + (t % 2) as f64 * 10.0));
    }

    assert!(!engine.score(&record("slow", 20, 1005.0)).is_anomaly);
    assert!(engine.score(&record("fast", 20, 1005.0)).is_anomaly);
}

#[test]
fn test_parallel_streams() {
    let engine = Arc::new(engine());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let name = format!("stream-{}", i);
                for t in 0..1_000 {
                    engine.score(&record(&name, t, 50.0 + (t % 3) as f64));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.stream_count(), 8);
    assert_eq!(engine.scored_total(), 8_000);
    for i in 0..8 {
        let stream = StreamId::parse(&format!("stream-{}", i)).unwrap();
        assert_eq!(engine.sample_count(&stream), 1_000);
    }
}

#[test]
fn test_concurrent_writers_on_one_stream() {
    let engine = Arc::new(engine());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for t in 0..500 {
                    engine.score(&record("shared", i * 1_000 + t, 10.0));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        engine.sample_count(&StreamId::parse("shared").unwrap()),
        2_000
    );
}

// ============================================================================
// Retrospective batches
// ============================================================================

#[test]
fn test_batch_matches_online_scoring() {
    let series: Vec<MetricRecord> = (0..200)
        .map(|t| record("b", t, 20.0 + ((t * 7) % 5) as f64))
        .chain(std::iter::once(record("b", 200, 500.0)))
        .collect();

    let online = engine();
    let expected: Vec<AnomalyResult> = series.iter().map(|r| online.score(r)).collect();

    let batch = engine().score_batch(&series);
    assert_eq!(batch, expected);
    assert!(batch.last().unwrap().is_anomaly);
}

#[test]
fn test_batch_orders_by_timestamp() {
    let mut series: Vec<MetricRecord> = (0..50).map(|t| record("b", t, 10.0)).collect();
    series.reverse();

    let results = engine().score_batch(&series);
    let times: Vec<i64> = results.iter().map(|r| r.timestamp.timestamp()).collect();
    let mut sorted = times.clone();
    sorted.sort();
    assert_eq!(times, sorted);
}

// ============================================================================
// Checkpoints
// ============================================================================

#[test]
fn test_checkpoint_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("baselines.json");

    let before = engine();
    for t in 0..30 {
        before.score(&record("api", t, 10.0 + (t % 2) as f64));
        before.score(&record("db", t, 3.0 + (t % 3) as f64));
    }
    before.checkpoint().save(&path).unwrap();

    let after = engine();
    let restored = after
        .restore(EngineCheckpoint::load(&path).unwrap())
        .unwrap();
    assert_eq!(restored, 2);

    // The restored baseline flags immediately, without a new warm-up
    assert!(after.score(&record("api", 30, 500.0)).is_anomaly);
    assert_eq!(
        before.state(&StreamId::parse("db").unwrap()),
        after.state(&StreamId::parse("db").unwrap())
    );
}

#[test]
fn test_checkpoint_window_model() {
    let before = window_engine(8);
    for t in 0..20 {
        before.score(&record("w", t, t as f64));
    }
    let after = window_engine(8);
    after.restore(before.checkpoint()).unwrap();
    assert_relative_eq!(
        after.state(&StreamId::parse("w").unwrap()).unwrap().mean(),
        15.5
    );

    let other_size = window_engine(9);
    assert!(matches!(
        other_size.restore(before.checkpoint()),
        Err(CheckpointError::ModelMismatch { .. })
    ));
}
