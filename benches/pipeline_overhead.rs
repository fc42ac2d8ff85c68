//! Benchmarks for the pipeline's per-call overhead: happy path (cache hit), cache miss
//! requiring the full guarded call, and the worst case of an open circuit breaker.

use criterion::{criterion_group, criterion_main, Criterion};
use resilient_client::{EndpointKey, Fingerprint, PipelineConfig, RawUpstreamError};
use std::hint::black_box;
use std::time::Duration;

fn config() -> PipelineConfig {
    let mut c = PipelineConfig::default();
    c.retry.max_retries = 0;
    c.retry.initial_delay_ms = Duration::from_millis(1);
    c
}

fn bench_cache_hit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let pipeline: resilient_client::Pipeline<i32> = resilient_client::Pipeline::new(&config());
    let fp = Fingerprint::new("quote:AAPL");
    let endpoint = EndpointKey::new("quote");
    runtime.block_on(async {
        pipeline.execute(&fp, &endpoint, || async { Ok::<i32, RawUpstreamError>(1) }).await.unwrap();
    });

    c.bench_function("pipeline_cache_hit", |b| {
        b.to_async(&runtime).iter(|| async {
            let result = pipeline.execute(&fp, &endpoint, || async { Ok::<i32, RawUpstreamError>(1) }).await;
            black_box(result).unwrap();
        });
    });
}

fn bench_cache_miss(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let pipeline: resilient_client::Pipeline<i32> = resilient_client::Pipeline::new(&config());
    let endpoint = EndpointKey::new("quote");
    let mut counter = 0u64;

    c.bench_function("pipeline_cache_miss", |b| {
        b.to_async(&runtime).iter(|| {
            counter += 1;
            let fp = Fingerprint::new(format!("quote:SYM{counter}"));
            let endpoint = endpoint.clone();
            let pipeline = &pipeline;
            async move {
                let result = pipeline.execute(&fp, &endpoint, || async { Ok::<i32, RawUpstreamError>(1) }).await;
                black_box(result).unwrap();
            }
        });
    });
}

fn bench_circuit_open(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let pipeline: resilient_client::Pipeline<i32> = resilient_client::Pipeline::new(&config());
    let endpoint = EndpointKey::new("quote");

    runtime.block_on(async {
        for i in 0..10 {
            let fp = Fingerprint::new(format!("quote:FAIL{i}"));
            let _ = pipeline
                .execute(&fp, &endpoint, || async { Err::<i32, _>(RawUpstreamError::new("connection refused")) })
                .await;
        }
    });

    let mut counter = 0u64;
    c.bench_function("pipeline_circuit_open_fallback", |b| {
        b.to_async(&runtime).iter(|| {
            counter += 1;
            let fp = Fingerprint::new(format!("quote:OPEN{counter}"));
            let endpoint = endpoint.clone();
            let pipeline = &pipeline;
            async move {
                let result = pipeline.execute(&fp, &endpoint, || async { Ok::<i32, RawUpstreamError>(1) }).await;
                black_box(result).ok();
            }
        });
    });
}

criterion_group!(pipeline_benches, bench_cache_hit, bench_cache_miss, bench_circuit_open);
criterion_main!(pipeline_benches);
