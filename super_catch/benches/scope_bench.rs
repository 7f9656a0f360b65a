//! Protected scope entry/exit benchmarks

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use super_catch::{protect, trigger};

/// Enter and leave a scope whose body completes normally
fn bench_normal_path(c: &mut Criterion) {
    // Installation happens once, outside the measurement.
    protect(|| ()).unwrap();

    c.bench_function("protect_normal_completion", |b| {
        b.iter(|| black_box(protect(|| black_box(42u64)).unwrap()));
    });

    c.bench_function("protect_nested_4", |b| {
        b.iter(|| {
            protect(|| protect(|| protect(|| protect(|| black_box(1u8)))))
                .unwrap()
                .unwrap()
                .unwrap()
                .unwrap()
        });
    });
}

/// Fault, dispatch, resume and build the exception
fn bench_fault_path(c: &mut Criterion) {
    c.bench_function("protect_null_dereference", |b| {
        b.iter(|| black_box(protect(trigger::null_dereference).unwrap_err()));
    });

    c.bench_function("protect_illegal_instruction", |b| {
        b.iter(|| black_box(protect(trigger::illegal_instruction).unwrap_err()));
    });
}

criterion_group!(benches, bench_normal_path, bench_fault_path);
criterion_main!(benches);
