use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use parking_lot::Mutex;
use soglie::counter::threshold::ThresholdCounter;
use soglie::counter::Position;

const NUM_THREADS: usize = 8;
const ITERATIONS_PER_THREAD: usize = 100_000;

// Thresholds far from the working range keep the benchmark on the fast path,
// which is the case the partitioning exists for.
const LOW: u64 = 0;
const HIGH: u64 = u64::MAX / 2;

struct MutexCounter {
    inner: Mutex<(u64, u64, u64)>,
}

impl MutexCounter {
    fn new(low: u64, high: u64) -> Self {
        MutexCounter {
            inner: Mutex::new((0, low, high)),
        }
    }

    fn add(&self, by: u64) -> Position {
        let mut guard = self.inner.lock();
        guard.0 += by;
        if guard.0 < guard.1 {
            Position::Below
        } else if guard.0 > guard.2 {
            Position::Above
        } else {
            Position::Between
        }
    }

    fn sum(&self) -> u64 {
        self.inner.lock().0
    }
}

fn bench_threshold_counter(c: &mut Criterion) {
    let mut group = c.benchmark_group("threshold_add");

    group.bench_function(
        BenchmarkId::new(
            "ThresholdCounter (partitioned)",
            format!("{}threads x {}iter", NUM_THREADS, ITERATIONS_PER_THREAD),
        ),
        |b| {
            b.iter(|| {
                let counter = Arc::new(ThresholdCounter::new());
                counter.initialize(LOW, HIGH);
                let mut handles = vec![];

                for _ in 0..NUM_THREADS {
                    let counter_clone = Arc::clone(&counter);
                    let handle = thread::spawn(move || {
                        for _ in 0..ITERATIONS_PER_THREAD {
                            counter_clone.add(1);
                            black_box(counter_clone.current_state());
                        }
                    });
                    handles.push(handle);
                }

                for handle in handles {
                    handle.join().unwrap();
                }

                black_box(counter.sum())
            })
        },
    );

    group.bench_function(
        BenchmarkId::new(
            "Mutex<(count, low, high)> (single)",
            format!("{}threads x {}iter", NUM_THREADS, ITERATIONS_PER_THREAD),
        ),
        |b| {
            b.iter(|| {
                let counter = Arc::new(MutexCounter::new(LOW, HIGH));
                let mut handles = vec![];

                for _ in 0..NUM_THREADS {
                    let counter_clone = Arc::clone(&counter);
                    let handle = thread::spawn(move || {
                        for _ in 0..ITERATIONS_PER_THREAD {
                            black_box(counter_clone.add(1));
                        }
                    });
                    handles.push(handle);
                }

                for handle in handles {
                    handle.join().unwrap();
                }

                black_box(counter.sum())
            })
        },
    );

    group.finish();
}

criterion_group!(benches, bench_threshold_counter);
criterion_main!(benches);
