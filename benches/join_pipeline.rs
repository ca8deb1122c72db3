use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use polars::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

use dcjoin::model::DataCollection;
use dcjoin::{DataEngine, EngineConfig, FilterDescriptor, JoinDeclaration, JoinKind, MemoryStorage, StaticCatalog};

fn gen_samples(n: usize, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let sample: Vec<i64> = (0..n as i64).collect();
    let site: Vec<String> = (0..n).map(|_| format!("site{}", rng.gen::<u32>() % 8)).collect();
    let depth: Vec<f64> = (0..n).map(|_| rng.gen::<f64>() * 100.0).collect();
    DataFrame::new(vec![
        Column::new("sample".into(), sample),
        Column::new("site".into(), site),
        Column::new("depth".into(), depth),
    ])
    .expect("samples df")
}

fn gen_variants(n: usize, samples: usize, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let sample: Vec<i64> = (0..n).map(|_| (rng.gen::<u64>() % samples as u64) as i64).collect();
    let gene: Vec<String> = (0..n).map(|_| format!("G{}", rng.gen::<u32>() % 500)).collect();
    let score: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
    DataFrame::new(vec![
        Column::new("sample".into(), sample),
        Column::new("gene".into(), gene),
        Column::new("score".into(), score),
    ])
    .expect("variants df")
}

fn setup(n: usize, cached: bool) -> DataEngine {
    let storage = MemoryStorage::new()
        .with_table("mem://samples", gen_samples(n, 0xABCD_1234))
        .with_table("mem://variants", gen_variants(n * 4, n, 0x1234_ABCD));
    let dc = |id: &str| DataCollection { id: id.into(), location: format!("mem://{}", id), size_bytes: None, columns: Default::default() };
    let catalog = Arc::new(
        StaticCatalog::default()
            .with_data_collection("wf", dc("samples"))
            .with_data_collection("wf", dc("variants"))
            .with_join("wf", JoinDeclaration::new("samples", "variants", JoinKind::Inner, &["sample"])),
    );
    let mut cfg = EngineConfig::default();
    for c in [&mut cfg.table_cache, &mut cfg.catalog_cache, &mut cfg.result_cache] { c.enabled = cached; }
    DataEngine::new(cfg, catalog.clone(), catalog, Arc::new(storage))
}

fn bench_join_pipeline(c: &mut Criterion) {
    let ns = [10_000usize, 100_000usize];
    let mut group = c.benchmark_group("join_pipeline");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(20);

    let filters = vec![
        FilterDescriptor::select("samples", "site", vec!["site1", "site3"]),
        FilterDescriptor::range("variants", "score", 0.25f64, 0.75f64),
    ];

    for &n in &ns {
        group.throughput(Throughput::Elements(n as u64));

        let cold = setup(n, false);
        group.bench_with_input(BenchmarkId::new("filtered_join_uncached", n.to_string()), &n, |b, _| {
            b.iter(|| cold.load("wf", "samples", &filters, None).expect("load"))
        });

        let warm = setup(n, true);
        warm.load("wf", "samples", &filters, None).expect("warmup");
        group.bench_with_input(BenchmarkId::new("filtered_join_cached", n.to_string()), &n, |b, _| {
            b.iter(|| warm.load("wf", "samples", &filters, None).expect("load"))
        });

        let single = setup(n, false);
        let own = vec![FilterDescriptor::select("samples", "site", vec!["site1"])];
        group.bench_with_input(BenchmarkId::new("single_table", n.to_string()), &n, |b, _| {
            b.iter(|| single.load("wf", "samples", &own, None).expect("load"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_join_pipeline);
criterion_main!(benches);
