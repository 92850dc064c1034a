//! Benchmark for the per-frame particle update path.
//!
//! TARGET: 100,000 live particles through a full module chain at 60 Hz
//!
//! Run with: cargo bench --package cinder_fx --bench update_benchmark

use cinder_fx::{
    CpuGroup, EmitterTiming, ScalarValue, SpawnParams, SpawnShape, UpdateModule, Vec3Value,
};
use cinder_core::{Transform, Vec3};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

const FRAME_DT: f32 = 1.0 / 60.0;

fn full_chain() -> Vec<UpdateModule> {
    vec![
        UpdateModule::Gravity {
            acceleration: Vec3::new(0.0, -9.81, 0.0),
        },
        UpdateModule::Drag { coefficient: 0.3 },
        UpdateModule::NoiseForce {
            amplitude: 0.5,
            frequency: 2.0,
        },
        UpdateModule::ScaleOverLife {
            scale: Vec3Value::RandomRange {
                min: Vec3::ONE,
                max: Vec3::new(2.0, 2.0, 2.0),
            },
        },
        UpdateModule::Translate,
        UpdateModule::Lifetime,
    ]
}

fn saturated_group(capacity: usize) -> CpuGroup {
    let mut group = CpuGroup::new(
        capacity,
        EmitterTiming {
            duration: 1.0,
            looping: true,
            rate: 0.0,
            burst: capacity as u32,
        },
        SpawnParams {
            shape: SpawnShape::Sphere { radius: 5.0 },
            lifetime: ScalarValue::Constant(1_000.0),
            speed: ScalarValue::RandomRange { min: 1.0, max: 4.0 },
            ..SpawnParams::default()
        },
        full_chain(),
        Transform::IDENTITY,
        true,
        42,
    );
    let _ = group.advance_phase(FRAME_DT);
    group.update(FRAME_DT);
    assert_eq!(group.live_count(), capacity);
    group
}

fn benchmark_single_frame(c: &mut Criterion) {
    let mut group = saturated_group(10_000);

    c.bench_function("update_10k_full_chain", |b| {
        b.iter(|| {
            group.update(black_box(FRAME_DT));
            black_box(group.live_count())
        });
    });
}

fn benchmark_100k_particles(c: &mut Criterion) {
    let mut group = saturated_group(100_000);

    let mut bench = c.benchmark_group("update_100k");
    bench.throughput(Throughput::Elements(100_000));
    bench.sample_size(20);

    bench.bench_function("full_chain", |b| {
        b.iter(|| {
            group.update(black_box(FRAME_DT));
            black_box(group.live_count())
        });
    });

    bench.finish();
}

fn benchmark_spawn_burst(c: &mut Criterion) {
    c.bench_function("spawn_4096_sphere", |b| {
        b.iter(|| {
            let mut group = CpuGroup::new(
                4096,
                EmitterTiming {
                    duration: 0.0,
                    looping: false,
                    rate: 0.0,
                    burst: 4096,
                },
                SpawnParams {
                    shape: SpawnShape::Sphere { radius: 2.0 },
                    lifetime: ScalarValue::Constant(1.0),
                    ..SpawnParams::default()
                },
                vec![UpdateModule::Lifetime],
                Transform::IDENTITY,
                true,
                7,
            );
            let _ = group.advance_phase(FRAME_DT);
            group.update(FRAME_DT);
            black_box(group.live_count())
        });
    });
}

criterion_group!(
    benches,
    benchmark_single_frame,
    benchmark_100k_particles,
    benchmark_spawn_burst
);
criterion_main!(benches);
