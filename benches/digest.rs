//! Digest benchmarks: streaming add, forced compression, queries and the codec.

use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use tdigest_kv::tdigest::{ScaleFamily, TDigest};
use tdigest_testdata::{gen_weighted, ValueShape, WeightShape};

const COMPRESSION: f64 = 100.0;

fn stream(n: usize) -> Vec<(f64, f64)> {
    gen_weighted(ValueShape::Clustered, WeightShape::Counts { max: 4 }, n, 4242)
}

fn built(n: usize, scale: ScaleFamily) -> TDigest {
    let mut td = TDigest::builder()
        .compression(COMPRESSION)
        .scale(scale)
        .build()
        .expect("compression");
    td.add_many(&stream(n)).expect("samples");
    td.compress();
    td
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("add");
    group.measurement_time(Duration::from_secs(3));
    for &n in &[1_000usize, 100_000, 1_000_000] {
        let data = stream(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("stream", n), &data, |b, data| {
            b.iter_batched(
                || TDigest::new(COMPRESSION).expect("compression"),
                |mut td| {
                    for &(v, w) in data {
                        td.add(v, w).expect("sample");
                    }
                    black_box(td.total_weight())
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");
    for scale in [ScaleFamily::K1, ScaleFamily::K2] {
        let base = built(50_000, scale);
        let extra = stream(400);
        group.bench_function(BenchmarkId::new("buffer_400", format!("{scale:?}")), |b| {
            b.iter_batched(
                || {
                    let mut td = base.clone();
                    td.add_many(&extra).expect("samples");
                    td
                },
                |mut td| {
                    td.compress();
                    black_box(td.centroids().len())
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let mut td = built(200_000, ScaleFamily::K1);

    group.bench_function("quantile", |b| {
        b.iter(|| black_box(td.quantile(black_box(0.99)).expect("quantile")));
    });
    group.bench_function("cdf", |b| {
        b.iter(|| black_box(td.cdf(black_box(42.0)).expect("cdf")));
    });

    for &m in &[1_000usize, 100_000] {
        let xs: Vec<f64> = (0..m).map(|i| i as f64 * 100.0 / m as f64).collect();
        group.throughput(Throughput::Elements(m as u64));
        group.bench_with_input(BenchmarkId::new("cdf_many", m), &xs, |b, xs| {
            b.iter(|| {
                let out = td.cdf_many(black_box(xs)).expect("cdf");
                black_box(out[out.len() / 2])
            });
        });
    }
    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let mut td = built(200_000, ScaleFamily::K1);
    let bytes = td.to_bytes();
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("encode", |b| {
        b.iter(|| black_box(td.to_bytes().len()));
    });
    group.bench_function("decode", |b| {
        b.iter(|| black_box(TDigest::from_bytes(black_box(&bytes)).expect("decode")));
    });
    group.finish();
}

criterion_group!(benches, bench_add, bench_compress, bench_queries, bench_codec);
criterion_main!(benches);
