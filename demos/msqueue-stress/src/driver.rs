use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{Builder, Scope, ScopedJoinHandle};
use std::time::Duration;

use anyhow::{Context, anyhow};
use msqueue::ConcurrentQueue;

use crate::Result;
use crate::config::{StressConfig, jitter};
use crate::report::Report;
use crate::stop::StopToken;

/// An item passed from a producer to a consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Item {
    pub producer: usize,
    /// Position in the producer's enqueue order, starting from zero.
    pub seq: u64,
    pub value: u32,
}

/// Runs producers and consumers over `queue` until every producer has
/// finished (or `stop` is cancelled) and the queue has been drained.
///
/// Cancellation only stops production: items already enqueued are still
/// consumed before this returns.
pub fn run(
    queue: &ConcurrentQueue<Item>,
    config: &StressConfig,
    stop: &StopToken,
) -> Result<Report> {
    let producing = AtomicUsize::new(config.producers.get());
    tracing::info!(
        "started stress, producers={}, consumers={}, items={}",
        config.producers,
        config.consumers,
        config.items
    );

    std::thread::scope(|cx| {
        let producing = &producing;
        let consumers = (0..config.consumers.get())
            .map(|id| {
                spawn(cx, format!("consumer-{id}"), move || {
                    consume(id, queue, config, stop, producing)
                })
            })
            .collect::<Result<Vec<_>>>();
        let consumers = match consumers {
            Ok(t) => t,
            Err(e) => {
                // No producer is running yet, let the spawned consumers exit.
                producing.store(0, Ordering::Release);
                return Err(e);
            },
        };

        let mut producers = Vec::with_capacity(config.producers.get());
        for id in 0..config.producers.get() {
            let handle = spawn(cx, format!("producer-{id}"), move || {
                let _guard = Finished(producing);
                produce(id, queue, config, stop)
            });
            match handle {
                Ok(t) => producers.push(t),
                Err(e) => {
                    // Stop the spawned producers and stop waiting for the rest.
                    stop.cancel();
                    producing.fetch_sub(config.producers.get() - id, Ordering::Release);
                    return Err(e);
                },
            }
        }

        let report = Report {
            produced: join_all(producers)?,
            consumed: join_all(consumers)?,
        };
        tracing::info!(
            "finished stress, produced={}, consumed={}",
            report.total_produced(),
            report.total_consumed()
        );
        Ok(report)
    })
}

/// Like [`run`], but cancels `stop` once `timeout` elapses.
///
/// Finishing early leaves `stop` untouched.
pub fn run_with_timeout(
    queue: &ConcurrentQueue<Item>,
    config: &StressConfig,
    stop: &StopToken,
    timeout: Option<Duration>,
) -> Result<Report> {
    let Some(timeout) = timeout else {
        return run(queue, config, stop);
    };

    let finished = StopToken::new();
    std::thread::scope(|cx| {
        let watchdog = spawn(cx, "watchdog".to_owned(), || {
            if !finished.sleep(timeout) && !stop.is_cancelled() {
                tracing::warn!("timed out after {timeout:?}, cancelling producers");
                stop.cancel();
            }
        })?;
        let report = run(queue, config, stop);
        finished.cancel();
        join_all(vec![watchdog])?;
        report
    })
}

fn spawn<'scope, 'env, T, F>(
    cx: &'scope Scope<'scope, 'env>,
    name: String,
    f: F,
) -> Result<ScopedJoinHandle<'scope, T>>
where
    T: Send + 'scope,
    F: FnOnce() -> T + Send + 'scope,
{
    Builder::new()
        .name(name.clone())
        .spawn_scoped(cx, f)
        .with_context(|| format!("failed to spawn {name}"))
}

fn join_all<T>(handles: Vec<ScopedJoinHandle<'_, T>>) -> Result<Vec<T>> {
    handles
        .into_iter()
        .map(|t| {
            let name = t.thread().name().unwrap_or("<unnamed>").to_owned();
            t.join().map_err(|_| anyhow!("{name} panicked"))
        })
        .collect()
}

/// Marks a producer as finished when dropped, even while unwinding, so that
/// consumers never wait for a dead producer.
struct Finished<'a>(&'a AtomicUsize);

impl Drop for Finished<'_> {
    fn drop(&mut self) {
        // `Release` publishes every enqueue of this producer to consumers that
        // observe the count.
        self.0.fetch_sub(1, Ordering::Release);
    }
}

fn produce(
    id: usize,
    queue: &ConcurrentQueue<Item>,
    config: &StressConfig,
    stop: &StopToken,
) -> u64 {
    let mut seq = 0;
    while seq < config.items && !stop.is_cancelled() {
        let value = fastrand::u32(0..100);
        queue.enqueue(Item {
            producer: id,
            seq,
            value,
        });
        tracing::info!("enqueued item, seq={seq}, value={value}");
        seq += 1;
        stop.sleep(jitter(config.max_produce_delay));
    }
    if stop.is_cancelled() {
        tracing::warn!("cancelled producer, produced={seq}");
    } else {
        tracing::debug!("exited producer, produced={seq}");
    }
    seq
}

fn consume(
    id: usize,
    queue: &ConcurrentQueue<Item>,
    config: &StressConfig,
    stop: &StopToken,
    producing: &AtomicUsize,
) -> Vec<Item> {
    let mut items = vec![];
    loop {
        // Must be observed before dequeuing: an empty queue only means
        // "drained" if no producer could have enqueued after the check.
        let drained = producing.load(Ordering::Acquire) == 0;
        match queue.dequeue() {
            Some(item) => {
                tracing::info!(
                    "dequeued item, consumer={id}, producer={}, seq={}, value={}",
                    item.producer,
                    item.seq,
                    item.value
                );
                items.push(item);
                stop.sleep(jitter(config.max_consume_delay));
            },
            None if drained => break,
            None => {
                // A cancelled token no longer pauses, keep giving way to the
                // producers still winding down.
                if stop.sleep(config.poll_interval) {
                    std::thread::yield_now();
                }
            },
        }
    }
    tracing::debug!("exited consumer, consumed={}", items.len());
    items
}
