//! Benchmarks for the reactive core: raw signal traffic, computed
//! revalidation, effect propagation, and batch coalescing.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mica_core::{batch, Computed, Effect, Signal};

fn bench_signal_rw(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal");

    group.bench_function("get_untracked", |b| {
        let signal = Signal::new(0u64);
        b.iter(|| black_box(signal.get_untracked()));
    });

    group.bench_function("set_no_observers", |b| {
        let signal = Signal::new(0u64);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            signal.set(black_box(i));
        });
    });

    group.finish();
}

fn bench_computed(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed");

    group.bench_function("cached_get", |b| {
        let signal = Signal::new(1u64);
        let signal_clone = signal.clone();
        let derived = Computed::new(move || signal_clone.get() * 2);
        derived.get();
        b.iter(|| black_box(derived.get()));
    });

    group.bench_function("invalidate_and_get", |b| {
        let signal = Signal::new(1u64);
        let signal_clone = signal.clone();
        let derived = Computed::new(move || signal_clone.get() * 2);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            signal.set(i);
            black_box(derived.get())
        });
    });

    group.bench_function("chain_of_8", |b| {
        let base = Signal::new(1u64);
        let base_clone = base.clone();
        let mut head = Computed::new(move || base_clone.get() + 1);
        for _ in 0..7 {
            let prev = head.clone();
            head = Computed::new(move || prev.get() + 1);
        }
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            base.set(i);
            black_box(head.get())
        });
    });

    group.finish();
}

fn bench_effect(c: &mut Criterion) {
    let mut group = c.benchmark_group("effect");

    group.bench_function("one_effect_per_write", |b| {
        let signal = Signal::new(0u64);
        let signal_clone = signal.clone();
        let _effect = Effect::new(move || {
            black_box(signal_clone.get());
        });
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            signal.set(i);
        });
    });

    group.bench_function("fanout_16_effects", |b| {
        let signal = Signal::new(0u64);
        let _effects: Vec<Effect> = (0..16)
            .map(|_| {
                let signal_clone = signal.clone();
                Effect::new(move || {
                    black_box(signal_clone.get());
                })
            })
            .collect();
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            signal.set(i);
        });
    });

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");

    group.bench_function("coalesce_64_writes", |b| {
        let signal = Signal::new(0u64);
        let signal_clone = signal.clone();
        let _effect = Effect::new(move || {
            black_box(signal_clone.get());
        });
        let mut i = 0u64;
        b.iter(|| {
            batch(|| {
                for _ in 0..64 {
                    i += 1;
                    signal.set(i);
                }
            });
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_signal_rw,
    bench_computed,
    bench_effect,
    bench_batch
);
criterion_main!(benches);
