//! Benchmarks for Pulse online and batch scoring

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pulse::{MetricRecord, StreamId};
use pulse_scoring::{ScoringConfig, ScoringEngine, ScoringModel};

fn generate_records(count: usize, streams: usize) -> Vec<MetricRecord> {
    let names: Vec<StreamId> = (0..streams)
        .map(|i| StreamId::parse(&format!("svc-{}", i)).unwrap())
        .collect();
    (0..count)
        .map(|i| {
            let latency = 20.0 + (i as f64 % 10.0) * 0.1;
            MetricRecord::at_epoch(names[i % streams].clone(), i as i64, latency).unwrap()
        })
        .collect()
}

fn bench_online(c: &mut Criterion) {
    let mut group = c.benchmark_group("online");

    let records = generate_records(1000, 8);
    group.throughput(Throughput::Elements(1000));

    for (name, model) in [
        ("ewma", ScoringModel::Ewma { alpha: 0.1 }),
        ("window_60", ScoringModel::Window { size: 60 }),
    ] {
        let engine = ScoringEngine::new(ScoringConfig {
            model,
            ..Default::default()
        })
        .unwrap();

        group.bench_function(format!("score_1000_{}", name), |b| {
            b.iter(|| {
                for r in &records {
                    black_box(engine.score(r));
                }
            })
        });
    }

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");

    let records = generate_records(10_000, 1);
    let engine = ScoringEngine::new(ScoringConfig::default()).unwrap();
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("score_batch_10000", |b| {
        b.iter(|| black_box(engine.score_batch(&records)))
    });

    group.finish();
}

criterion_group!(benches, bench_online, bench_batch);
criterion_main!(benches);
