use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use sky_core::RandomStateService;
use sky_inference::LlhRatioAnalysis;
use std::hint::black_box;

#[path = "../tests/common/mod.rs"]
mod common;

fn bench_single_trial_n_events_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("trials/single_trial/two_datasets/n_events_scaling");
    group.sample_size(20);
    for n_exp in [100usize, 1_000, 10_000] {
        let ana = common::constructed_analysis(2, n_exp);
        for sig_mean in [0.0, 10.0] {
            group.bench_with_input(
                BenchmarkId::new(format!("sig_mean={sig_mean}"), n_exp),
                &ana,
                |b, ana| {
                    let mut rss = RandomStateService::from_seed(42);
                    b.iter(|| {
                        let res = ana.do_trial(&mut rss, None, black_box(sig_mean), None).unwrap();
                        black_box(res.record.ts);
                    });
                },
            );
        }
    }
    group.finish();
}

fn bench_trial_batch_ncpu(c: &mut Criterion) {
    let ana = common::constructed_analysis(2, 1_000);
    let mut group = c.benchmark_group("trials/batch_of_32/ncpu");
    group.sample_size(10);
    for ncpu in [1usize, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(ncpu), &ncpu, |b, &ncpu| {
            let mut rss = RandomStateService::from_seed(7);
            b.iter(|| {
                let table = ana.do_trials(&mut rss, 32, None, 5.0, Some(ncpu), None).unwrap();
                black_box(table.len());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_trial_n_events_scaling, bench_trial_batch_ncpu);
criterion_main!(benches);
