//! Benchmark: engine MSM across sizes, thread counts and window knobs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sarissa::{Bn254Engine, CurveParams, MsmOptions};

fn bench_msm_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("msm_bn254");
    group.sample_size(10);

    for exp in [10u32, 12, 14] {
        let n = 1usize << exp;
        let engine = Bn254Engine::create(&CurveParams::bn254()).unwrap();
        let points = engine.random_points_fast(n, exp as u64);
        let mut rng = ark_std::test_rng();
        let scalars = engine.random_scalars(n, &mut rng);

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("single_thread", n), &n, |b, _| {
            b.iter(|| {
                black_box(
                    engine
                        .msm(&scalars, &points, &MsmOptions::default())
                        .unwrap(),
                )
            });
        });

        let mut threaded = Bn254Engine::create(&CurveParams::bn254()).unwrap();
        threaded.start_threads(8).unwrap();
        group.bench_with_input(BenchmarkId::new("eight_threads", n), &n, |b, _| {
            b.iter(|| {
                black_box(
                    threaded
                        .msm(&scalars, &points, &MsmOptions::default())
                        .unwrap(),
                )
            });
        });
        threaded.stop_threads().unwrap();
    }
    group.finish();
}

fn bench_safe_vs_unsafe(c: &mut Criterion) {
    let mut group = c.benchmark_group("msm_batch_add_variants");
    group.sample_size(10);

    let n = 1 << 12;
    let engine = Bn254Engine::create(&CurveParams::bn254()).unwrap();
    let points = engine.random_points_fast(n, 7);
    let mut rng = ark_std::test_rng();
    let scalars = engine.random_scalars(n, &mut rng);

    group.bench_function("safe", |b| {
        b.iter(|| {
            black_box(
                engine
                    .msm(&scalars, &points, &MsmOptions::default())
                    .unwrap(),
            )
        });
    });
    group.bench_function("unsafe_first_level", |b| {
        b.iter(|| {
            black_box(
                engine
                    .msm_unsafe(&scalars, &points, &MsmOptions::default())
                    .unwrap(),
            )
        });
    });
    group.finish();
}

criterion_group!(benches, bench_msm_sizes, bench_safe_vs_unsafe);
criterion_main!(benches);
