// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Lock acquisition benchmarks.

use std::sync::Arc;
use std::thread;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use recursiverwlock::{RawRwLock, RecursionMode, RwLock};

fn bench_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread");
    group.throughput(Throughput::Elements(1));

    let lock = RwLock::new(0u64);
    group.bench_function("read", |b| {
        b.iter(|| {
            let value = lock.read();
            black_box(*value);
        });
    });
    group.bench_function("write", |b| {
        b.iter(|| {
            let mut value = lock.write();
            *value = black_box(*value).wrapping_add(1);
        });
    });

    let raw = RawRwLock::with_mode(RecursionMode::Recursive);
    group.bench_function("recursive_read", |b| {
        b.iter(|| {
            raw.read().unwrap();
            raw.read_unlock().unwrap();
        });
    });
    group.bench_function("nested_reacquire", |b| {
        raw.read().unwrap();
        b.iter(|| {
            raw.read().unwrap();
            raw.read_unlock().unwrap();
        });
        raw.read_unlock().unwrap();
    });
    group.bench_function("promotion", |b| {
        b.iter(|| {
            raw.read().unwrap();
            raw.write().unwrap();
            raw.write_unlock().unwrap();
            raw.read_unlock().unwrap();
        });
    });
    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    const OPS_PER_THREAD: u64 = 100;
    let mut group = c.benchmark_group("contended");

    for &threads in &[2usize, 4] {
        group.throughput(Throughput::Elements(threads as u64 * OPS_PER_THREAD));

        group.bench_with_input(BenchmarkId::new("readers", threads), &threads, |b, &threads| {
            let lock = Arc::new(RwLock::new(0u64));
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let lock = Arc::clone(&lock);
                        thread::spawn(move || {
                            for _ in 0..OPS_PER_THREAD {
                                black_box(*lock.read());
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("mixed", threads), &threads, |b, &threads| {
            let lock = Arc::new(RwLock::new(0u64));
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|i| {
                        let lock = Arc::clone(&lock);
                        thread::spawn(move || {
                            for _ in 0..OPS_PER_THREAD {
                                if i == 0 {
                                    *lock.write() += 1;
                                } else {
                                    black_box(*lock.read());
                                }
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_thread, bench_contended);
criterion_main!(benches);
