//! Benchmarks for invalidation and recomputation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use orb_core::reactive::{atom, Derived, Readable, Runtime};
use orb_core::SettleMode;

fn chain(len: usize) -> (orb_core::Setter<u64>, Vec<Derived<u64>>) {
    let (root, set_root) = atom(0u64);
    let mut values: Vec<Derived<u64>> = Vec::with_capacity(len);
    for i in 0..len {
        let derived = match values.last() {
            None => {
                let root = root.clone();
                Derived::new(move |orb| orb.read(&root) + 1)
            }
            Some(prev) => {
                let prev = prev.clone();
                Derived::new(move |orb| orb.read(&prev) + i as u64)
            }
        };
        values.push(derived);
    }
    (set_root, values)
}

fn bench_atom(c: &mut Criterion) {
    let mut group = c.benchmark_group("atom");
    Runtime::set_mode(SettleMode::Sync);

    group.bench_function("set_no_consumers", |b| {
        let (_value, set_value) = atom(0u64);
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            set_value.set(black_box(n))
        })
    });

    group.bench_function("set_equal_value", |b| {
        let (_value, set_value) = atom(7u64);
        b.iter(|| set_value.set(black_box(7)))
    });

    group.finish();
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");
    Runtime::set_mode(SettleMode::Sync);

    for len in [1, 10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("write_then_read", len), &len, |b, &len| {
            let (set_root, values) = chain(len);
            let tail = values.last().cloned().expect("chain is non-empty");
            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                set_root.set(n);
                black_box(tail.get_untracked())
            })
        });
    }

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    Runtime::set_mode(SettleMode::Microtask);

    for width in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("invalidate", width), &width, |b, &width| {
            let (root, set_root) = atom(0u64);
            let values: Vec<_> = (0..width)
                .map(|i| {
                    let root = root.clone();
                    Derived::new(move |orb| orb.read(&root) * i)
                })
                .collect();
            for value in &values {
                value.get_untracked();
            }

            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                set_root.set(n);
                Runtime::run_microtasks();
                for value in &values {
                    black_box(value.get_untracked());
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_atom, bench_chain, bench_fan_out);
criterion_main!(benches);
