use std::num::NonZeroUsize;
use std::time::Duration;

/// Parameters of a stress run.
#[derive(Clone, Debug)]
pub struct StressConfig {
    /// Number of items enqueued by each producer.
    pub items: u64,
    pub producers: NonZeroUsize,
    pub consumers: NonZeroUsize,
    /// Upper bound of the random pause after each enqueue.
    pub max_produce_delay: Duration,
    /// Upper bound of the random pause after each successful dequeue.
    pub max_consume_delay: Duration,
    /// Pause before polling an empty queue again.
    pub poll_interval: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            items: 10,
            producers: NonZeroUsize::MIN,
            consumers: const { NonZeroUsize::new(5).unwrap() },
            max_produce_delay: Duration::from_millis(500),
            max_consume_delay: Duration::from_millis(800),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl StressConfig {
    /// A config without any pauses, for hammering the queue.
    pub fn burst(items: u64, producers: NonZeroUsize, consumers: NonZeroUsize) -> Self {
        Self {
            items,
            producers,
            consumers,
            max_produce_delay: Duration::ZERO,
            max_consume_delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
        }
    }
}

/// Returns a random duration in `[0, max]`.
pub(crate) fn jitter(max: Duration) -> Duration {
    let max = u64::try_from(max.as_micros()).unwrap_or(u64::MAX);
    Duration::from_micros(fastrand::u64(0..=max))
}
