use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dataloader_core::loader::{BatchFetcher, FetchResult, Loader};
use dataloader_core::LoaderConfig;
use std::convert::Infallible;
use std::time::Duration;
use tokio::runtime::Runtime;

struct Echo;

#[async_trait]
impl BatchFetcher for Echo {
    type Key = u64;
    type Value = u64;
    type Error = Infallible;

    async fn fetch(&self, keys: &[u64]) -> FetchResult<u64, Infallible> {
        Ok(keys.iter().map(|key| Ok(key * 2)).collect())
    }
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("benchmark runtime")
}

fn benchmark_load_all(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("load_all");

    for max_batch in [0usize, 16, 200] {
        group.bench_with_input(BenchmarkId::from_parameter(max_batch), &max_batch, |b, &max_batch| {
            b.iter(|| {
                let loader = Loader::new("echo", Echo, LoaderConfig::new(max_batch, Duration::ZERO));
                rt.block_on(loader.load_all(black_box(0..500u64)))
            })
        });
    }

    group.finish();
}

fn benchmark_cache_hits(c: &mut Criterion) {
    let rt = runtime();
    let loader = Loader::new("echo", Echo, LoaderConfig::new(0, Duration::ZERO));
    rt.block_on(loader.load_all(0..500u64));

    c.bench_function("cache_hits", |b| {
        b.iter(|| rt.block_on(loader.load(black_box(42))))
    });
}

fn benchmark_prime(c: &mut Criterion) {
    c.bench_function("prime_and_clear", |b| {
        let loader = Loader::new("echo", Echo, LoaderConfig::default());
        b.iter(|| {
            loader.prime(black_box(7), 14);
            loader.clear(&7);
        })
    });
}

criterion_group!(benches, benchmark_load_all, benchmark_cache_hits, benchmark_prime);
criterion_main!(benches);
