//! Criterion benchmarks for the staged bitonic network.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use bitonic_stages::workload::{generate, InputPattern};
use bitonic_stages::{reference, BitonicSorter, CpuSubstrate, Direction, SortConfig};

const SIZE_EXPONENTS: [usize; 5] = [10, 12, 14, 16, 18];

/// Staged network on the rayon substrate against std and the single-threaded network.
fn bench_sorts(c: &mut Criterion) {
    let mut group = c.benchmark_group("Bitonic");
    let mut sorter = BitonicSorter::new(CpuSubstrate::new().expect("thread pool"));

    for size_exp in SIZE_EXPONENTS {
        let size = 1usize << size_exp;
        let config = SortConfig::new(size, Direction::Ascending).expect("power of two");
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("staged_cpu", size), &size, |b, &size| {
            b.iter_batched(
                || generate(InputPattern::Wide, size, 1),
                |mut data| {
                    sorter.sort(black_box(&mut data), &config).expect("sort");
                    data
                },
                BatchSize::LargeInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("reference", size), &size, |b, &size| {
            b.iter_batched(
                || generate(InputPattern::Wide, size, 1),
                |mut data| {
                    reference::sort(black_box(&mut data), Direction::Ascending);
                    data
                },
                BatchSize::LargeInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("std_unstable", size), &size, |b, &size| {
            b.iter_batched(
                || generate(InputPattern::Wide, size, 1),
                |mut data| {
                    black_box(&mut data).sort_unstable();
                    data
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

/// Effect of the work-group width on the number of global rounds.
fn bench_local_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("LocalSize");
    let size = 1usize << 16;
    let mut sorter = BitonicSorter::new(CpuSubstrate::new().expect("thread pool"));

    for local_size in [1, 4, 16, 64, 256] {
        let config = SortConfig::new(size, Direction::Ascending)
            .and_then(|c| c.with_local_size(local_size))
            .expect("valid config");
        group.bench_with_input(
            BenchmarkId::from_parameter(local_size),
            &local_size,
            |b, _| {
                b.iter_batched(
                    || generate(InputPattern::Wide, size, 2),
                    |mut data| {
                        sorter.sort(black_box(&mut data), &config).expect("sort");
                        data
                    },
                    BatchSize::LargeInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_sorts, bench_local_size);
criterion_main!(benches);
