use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use criterion::{Criterion, criterion_group, criterion_main};
use msqueue::ConcurrentQueue;

const THREADS: &[usize] = &[1, 2, 4, 8];

type BenchFn = fn(usize, usize) -> Duration;

trait Fifo<T>: Sync {
    fn push(&self, val: T);
    fn pop(&self) -> Option<T>;
}

impl<T: Send> Fifo<T> for ConcurrentQueue<T> {
    fn push(&self, val: T) {
        self.enqueue(val)
    }
    fn pop(&self) -> Option<T> {
        self.dequeue()
    }
}

impl<T: Send> Fifo<T> for Mutex<VecDeque<T>> {
    fn push(&self, val: T) {
        self.lock().unwrap().push_back(val)
    }
    fn pop(&self) -> Option<T> {
        self.lock().unwrap().pop_front()
    }
}

/// Runs `threads` producers and as many consumers over `queue`, returning the
/// time taken to move `iters` items through it.
fn run<Q: Fifo<usize>>(queue: Q, iters: usize, threads: usize) -> Duration {
    let per_thread = iters.div_ceil(threads);
    let total = per_thread * threads;
    let consumed = AtomicUsize::new(0);

    let now = Instant::now();
    std::thread::scope(|cx| {
        for _ in 0..threads {
            cx.spawn(|| {
                for i in 0..per_thread {
                    queue.push(i);
                }
            });
            cx.spawn(|| {
                while consumed.load(Ordering::Relaxed) < total {
                    if queue.pop().is_some() {
                        consumed.fetch_add(1, Ordering::Relaxed);
                    } else {
                        std::hint::spin_loop();
                    }
                }
            });
        }
    });
    now.elapsed()
}

fn bench_msqueue(iters: usize, threads: usize) -> Duration {
    run(ConcurrentQueue::new(), iters, threads)
}

fn bench_mutex(iters: usize, threads: usize) -> Duration {
    run(Mutex::new(VecDeque::new()), iters, threads)
}

fn groups(c: &mut Criterion) {
    let mut g = c.benchmark_group("contention");
    for threads in THREADS.iter().copied() {
        for (name, f) in [
            ("msqueue", bench_msqueue as BenchFn),
            ("mutex", bench_mutex as BenchFn),
        ] {
            let id = format!("contention_{threads:02}x{threads:02}_{name}");
            g.bench_function(&id, |b| {
                b.iter_custom(|iters| f(iters as usize, threads))
            });
        }
    }
}

criterion_group!(
    name = contention;
    config = Criterion::default().sample_size(50).measurement_time(Duration::from_secs(10));
    targets = groups
);
criterion_main!(contention);
