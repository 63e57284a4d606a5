//! Submit-and-wait latency through the bridge

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use veda_bridge::prelude::*;

fn runtime(capture_call_site: bool) -> Runtime {
    let config = Config::builder()
        .num_threads(2)
        .capture_call_site(capture_call_site)
        .build()
        .expect("valid config");
    Runtime::new(config).expect("Failed to create runtime")
}

fn bench_success(c: &mut Criterion) {
    let mut group = c.benchmark_group("success");

    for capture in [false, true] {
        let rt = runtime(capture);
        group.bench_with_input(BenchmarkId::new("capture_call_site", capture), &capture, |b, _| {
            b.iter(|| {
                let future = rt.submit(|| Ok(black_box(21) * 2)).unwrap();
                future.wait().unwrap()
            })
        });
        rt.destroy();
    }

    group.finish();
}

fn bench_failure(c: &mut Criterion) {
    let rt = runtime(true);

    c.bench_function("failure_marshalled", |b| {
        b.iter(|| {
            let future = rt
                .submit(|| -> Result<i32, _> { Err(ErrorPayload::invalid_argument("bench")) })
                .unwrap();
            black_box(future.wait().unwrap_err())
        })
    });

    rt.destroy();
}

fn bench_batch(c: &mut Criterion) {
    let rt = runtime(false);
    let mut group = c.benchmark_group("batch");

    for size in [10, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let futures: Vec<_> = (0..size).map(|i| rt.submit(move || Ok(i)).unwrap()).collect();
                futures.iter().map(|f| f.wait().unwrap()).sum::<i32>()
            })
        });
    }

    group.finish();
    rt.destroy();
}

criterion_group!(benches, bench_success, bench_failure, bench_batch);
criterion_main!(benches);
